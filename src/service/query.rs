//! Query strategies: filter+sort+paginate, or delegate to search.

use crate::data::{ScopeRef, SearchHits, SearchOptions, SearchOutcome, SortDirection};
use crate::error::PresenterError;
use crate::params::Params;
use crate::presenter::{FilterApply, PresenterDefinition, SortExpr};
use serde_json::Value;

/// Pagination/behavior knobs resolved by the collection before execution.
#[derive(Clone, Debug)]
pub struct QueryOptions {
    pub default_per_page: u64,
    pub default_max_per_page: u64,
    pub per_page: Option<u64>,
    pub max_per_page: Option<u64>,
    /// Apply declared filter defaults when the request omits them.
    pub apply_default_filters: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            default_per_page: 20,
            default_max_per_page: 200,
            per_page: None,
            max_per_page: None,
            apply_default_filters: true,
        }
    }
}

/// Executed result set, pre-render.
pub struct QueryResult {
    pub rows: Vec<crate::data::ModelRef>,
    pub count: u64,
    pub page: u64,
    pub per_page: u64,
    /// The request restricted itself to an explicit id list.
    pub only_query: bool,
}

pub struct QueryStrategy;

impl QueryStrategy {
    /// Execute the request against `scope`. Search wins whenever a non-blank
    /// `search` param is present and the presenter declares the capability;
    /// everything else goes through filters + sort + pagination.
    pub async fn run(
        presenter: &PresenterDefinition,
        scope: ScopeRef,
        params: &Params,
        options: &QueryOptions,
    ) -> Result<QueryResult, PresenterError> {
        let per_page = resolve_per_page(params, options);
        let page = params.get_u64("page").unwrap_or(1).max(1);

        if let Some(query) = params.get_present("search") {
            if let Some(search) = presenter.search() {
                tracing::debug!(query = %query, "query strategy: search");
                return Self::run_search(presenter, scope, params, &query, &search, page, per_page)
                    .await;
            }
        }
        tracing::debug!(page, per_page, "query strategy: filter");
        Self::run_filter(presenter, scope, params, options, page, per_page).await
    }

    async fn run_filter(
        presenter: &PresenterDefinition,
        scope: ScopeRef,
        params: &Params,
        options: &QueryOptions,
        page: u64,
        per_page: u64,
    ) -> Result<QueryResult, PresenterError> {
        let mut scope = scope;

        let only_ids: Vec<Value> = params
            .get_list("only")
            .into_iter()
            .map(Value::String)
            .collect();
        let only_query = !only_ids.is_empty();
        if only_query {
            scope = scope.restricted_to_ids(&only_ids);
        }

        // Requested-or-defaulted filters, in declaration order.
        for filter in presenter.filters() {
            let arg = match params.get(&filter.name) {
                Some(value) => Some(value.clone()),
                None if options.apply_default_filters => filter.default.clone(),
                None => None,
            };
            let Some(arg) = arg else { continue };
            scope = match &filter.apply {
                FilterApply::Closure(f) => {
                    let forwarded = filter.include_params.then_some(params);
                    f(scope, &arg, forwarded)?
                }
                FilterApply::NamedScope(name) => scope.named(name, &arg)?,
            };
        }

        scope = apply_sort(presenter, scope, params);
        // Deterministic tiebreaker: ties in the primary sort must not
        // reshuffle rows between pages.
        let primary_key = scope.primary_key().to_string();
        scope = scope.ordered(&primary_key, SortDirection::Asc);

        let count = scope.count().await?;
        // A caller-supplied page far past the data must yield an empty
        // page, not an overflowing offset.
        let offset = (page - 1).saturating_mul(per_page);
        let rows = if offset >= count {
            Vec::new()
        } else {
            scope.paginated(per_page, offset).rows().await?
        };
        Ok(QueryResult {
            rows,
            count,
            page,
            per_page,
            only_query,
        })
    }

    async fn run_search(
        presenter: &PresenterDefinition,
        scope: ScopeRef,
        params: &Params,
        query: &str,
        search: &crate::data::SearchFn,
        page: u64,
        per_page: u64,
    ) -> Result<QueryResult, PresenterError> {
        let search_options = SearchOptions {
            params: params.clone(),
            filters: presenter.filters().iter().map(|f| f.name.clone()).collect(),
            sort_orders: {
                let mut names: Vec<String> = presenter.sort_orders().into_keys().collect();
                names.sort();
                names
            },
            includes: params.get_list("include"),
            page,
            per_page,
        };
        match search(query, &search_options) {
            SearchOutcome::Unavailable => Err(PresenterError::SearchUnavailable),
            SearchOutcome::Results { hits, count } => {
                // The provider's ordering is authoritative.
                let rows = match hits {
                    SearchHits::Models(models) => models,
                    SearchHits::Ids(ids) => scope.rows_by_ids(&ids).await?,
                };
                Ok(QueryResult {
                    rows,
                    count,
                    page,
                    per_page,
                    only_query: false,
                })
            }
        }
    }
}

fn resolve_per_page(params: &Params, options: &QueryOptions) -> u64 {
    let max = options.max_per_page.unwrap_or(options.default_max_per_page);
    let requested = params
        .get_u64("per_page")
        .or(options.per_page)
        .unwrap_or(options.default_per_page);
    requested.clamp(1, max.max(1))
}

fn apply_sort(presenter: &PresenterDefinition, scope: ScopeRef, params: &Params) -> ScopeRef {
    let requested = params.get_present("order").map(|order| {
        let mut parts = order.splitn(2, ':');
        let name = parts.next().unwrap_or("").trim().to_string();
        let direction = SortDirection::parse(parts.next().unwrap_or("asc").trim());
        (name, direction)
    });

    // Unknown names fall back to the presenter default.
    let resolved = requested
        .filter(|(name, _)| presenter.sort_order(name).is_some())
        .or_else(|| presenter.default_sort_order());

    let Some((name, direction)) = resolved else {
        return scope;
    };
    let Some(sort_order) = presenter.sort_order(&name) else {
        return scope;
    };
    match &sort_order.expr {
        SortExpr::Column(expression) => scope.ordered(expression, direction),
        SortExpr::Closure(f) => f(scope, direction),
    }
}

/// `ceil(count / page_size)`; zero when the set is empty.
pub fn page_count(count: u64, page_size: u64) -> u64 {
    if count == 0 || page_size == 0 {
        0
    } else {
        count.div_ceil(page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryModel, MemoryStore};
    use crate::presenter::{
        FieldDescriptor, FieldType, FilterDescriptor, PresenterBuilder, SortOrderDescriptor,
    };
    use crate::data::{id_string, SearchOutcome};
    use serde_json::json;
    use std::sync::Arc;

    fn store_with_ids(ids: &[i64]) -> Arc<MemoryStore> {
        let mut store = MemoryStore::new();
        for id in ids {
            store.insert(MemoryModel::new("Task", *id).with("title", format!("t{}", id)));
        }
        Arc::new(store)
    }

    fn presenter() -> PresenterDefinition {
        PresenterBuilder::new("TaskPresenter")
            .presents("Task")
            .field(FieldDescriptor::property("title", FieldType::String))
            .sort_order(SortOrderDescriptor::column("id", "id"))
            .default_sort_order("id:asc")
            .build(None)
            .unwrap()
    }

    fn ids(result: &QueryResult) -> Vec<String> {
        result.rows.iter().map(|m| id_string(m.as_ref())).collect()
    }

    #[tokio::test]
    async fn five_rows_per_page_two_page_two() {
        let store = store_with_ids(&[1, 2, 3, 4, 5]);
        let presenter = presenter();
        let params = Params::from_value(json!({"per_page": 2, "page": 2}));
        let result = QueryStrategy::run(
            &presenter,
            store.scope("Task"),
            &params,
            &QueryOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(ids(&result), vec!["3", "4"]);
        assert_eq!(result.count, 5);
        assert_eq!(page_count(result.count, result.per_page), 3);
    }

    #[tokio::test]
    async fn concatenated_pages_reproduce_the_set_exactly_once() {
        let store = store_with_ids(&[5, 3, 1, 4, 2]);
        let presenter = presenter();
        let mut seen = Vec::new();
        for page in 1..=3 {
            let params = Params::from_value(json!({"per_page": 2, "page": page}));
            let result = QueryStrategy::run(
                &presenter,
                store.scope("Task"),
                &params,
                &QueryOptions::default(),
            )
            .await
            .unwrap();
            seen.extend(ids(&result));
        }
        assert_eq!(seen, vec!["1", "2", "3", "4", "5"]);
    }

    #[tokio::test]
    async fn page_past_the_data_yields_an_empty_page() {
        let store = store_with_ids(&[1, 2, 3]);
        let presenter = presenter();
        let params = Params::from_value(json!({"page": u64::MAX, "per_page": 20}));
        let result = QueryStrategy::run(
            &presenter,
            store.scope("Task"),
            &params,
            &QueryOptions::default(),
        )
        .await
        .unwrap();
        assert!(result.rows.is_empty());
        assert_eq!(result.count, 3);
    }

    #[tokio::test]
    async fn per_page_is_clamped() {
        let params = Params::from_value(json!({"per_page": 9999}));
        assert_eq!(resolve_per_page(&params, &QueryOptions::default()), 200);
        let params = Params::from_value(json!({"per_page": 0}));
        assert_eq!(resolve_per_page(&params, &QueryOptions::default()), 1);
        let params = Params::new();
        assert_eq!(resolve_per_page(&params, &QueryOptions::default()), 20);
    }

    #[tokio::test]
    async fn default_filters_apply_when_params_omit_them() {
        let mut store = MemoryStore::new();
        store.insert(MemoryModel::new("Task", 1).with("archived", false));
        store.insert(MemoryModel::new("Task", 2).with("archived", true));
        store.named_scope("archived", |rows, arg| {
            let want = arg.as_bool().unwrap_or(false)
                || arg.as_str().map(|s| s == "true").unwrap_or(false);
            rows.into_iter()
                .filter(|m| {
                    m.attribute("archived")
                        .map(|v| v.canonical() == json!(want))
                        .unwrap_or(false)
                })
                .collect()
        });
        let store = Arc::new(store);
        let presenter = PresenterBuilder::new("TaskPresenter")
            .presents("Task")
            .filter(FilterDescriptor::scope("archived").default(json!(false)))
            .build(None)
            .unwrap();

        let result = QueryStrategy::run(
            &presenter,
            store.scope("Task"),
            &Params::new(),
            &QueryOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(ids(&result), vec!["1"]);

        // Explicit param wins over the default.
        let params = Params::from_value(json!({"archived": true}));
        let result = QueryStrategy::run(
            &presenter,
            store.scope("Task"),
            &params,
            &QueryOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(ids(&result), vec!["2"]);
    }

    #[tokio::test]
    async fn only_query_restricts_to_ids() {
        let store = store_with_ids(&[1, 2, 3, 4]);
        let presenter = presenter();
        let params = Params::from_value(json!({"only": "3,1"}));
        let result = QueryStrategy::run(
            &presenter,
            store.scope("Task"),
            &params,
            &QueryOptions::default(),
        )
        .await
        .unwrap();
        assert!(result.only_query);
        assert_eq!(result.count, 2);
        assert_eq!(ids(&result), vec!["1", "3"]);
    }

    #[tokio::test]
    async fn search_order_is_authoritative() {
        let store = store_with_ids(&[1, 2, 3, 4, 5]);
        let presenter = PresenterBuilder::new("TaskPresenter")
            .presents("Task")
            .default_sort_order("id:asc")
            .sort_order(SortOrderDescriptor::column("id", "id"))
            .search(|_query, _options| SearchOutcome::Results {
                hits: crate::data::SearchHits::Ids(vec![json!(4), json!(2), json!(5)]),
                count: 3,
            })
            .build(None)
            .unwrap();
        let params = Params::from_value(json!({"search": "anything"}));
        let result = QueryStrategy::run(
            &presenter,
            store.scope("Task"),
            &params,
            &QueryOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(ids(&result), vec!["4", "2", "5"]);
        assert_eq!(result.count, 3);
    }

    #[tokio::test]
    async fn unavailable_search_is_a_distinct_error() {
        let store = store_with_ids(&[1]);
        let presenter = PresenterBuilder::new("TaskPresenter")
            .presents("Task")
            .search(|_query, _options| SearchOutcome::Unavailable)
            .build(None)
            .unwrap();
        let params = Params::from_value(json!({"search": "x"}));
        let err = QueryStrategy::run(
            &presenter,
            store.scope("Task"),
            &params,
            &QueryOptions::default(),
        )
        .await
        .map(|_| ())
        .unwrap_err();
        assert!(matches!(err, PresenterError::SearchUnavailable));
    }

    #[tokio::test]
    async fn blank_search_param_uses_filter_strategy() {
        let store = store_with_ids(&[2, 1]);
        let presenter = PresenterBuilder::new("TaskPresenter")
            .presents("Task")
            .default_sort_order("id:asc")
            .sort_order(SortOrderDescriptor::column("id", "id"))
            .search(|_query, _options| SearchOutcome::Unavailable)
            .build(None)
            .unwrap();
        let params = Params::from_value(json!({"search": "  "}));
        let result = QueryStrategy::run(
            &presenter,
            store.scope("Task"),
            &params,
            &QueryOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(ids(&result), vec!["1", "2"]);
    }

    #[test]
    fn page_count_math() {
        assert_eq!(page_count(0, 2), 0);
        assert_eq!(page_count(5, 2), 3);
        assert_eq!(page_count(4, 2), 2);
        assert_eq!(page_count(1, 20), 1);
    }
}
