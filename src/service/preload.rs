//! Association preloading: dedup/normalize, then one batch call.

use crate::data::{DataSource, ModelRef, PreloadSpec};
use crate::error::PresenterError;
use std::collections::{HashMap, HashSet};

pub struct Preloader;

impl Preloader {
    /// Clean the raw preload request and hand it to the data layer in a
    /// single batch call. No-op on an empty model batch or when nothing
    /// valid remains after cleaning.
    pub async fn preload(
        data: &dyn DataSource,
        models: &[ModelRef],
        requested: &[PreloadSpec],
        valid_associations: &HashSet<String>,
    ) -> Result<(), PresenterError> {
        if models.is_empty() {
            return Ok(());
        }
        let cleaned = Self::clean(requested, valid_associations);
        if cleaned.is_empty() {
            return Ok(());
        }
        tracing::debug!(batch = models.len(), spec = ?cleaned, "preload");
        data.preload(models, &cleaned).await
    }

    /// Merge entries by top-level name (nested structure preserved, nested
    /// duplicates dropped), then drop names absent from the valid set.
    pub fn clean(
        requested: &[PreloadSpec],
        valid_associations: &HashSet<String>,
    ) -> HashMap<String, Vec<PreloadSpec>> {
        let mut out: HashMap<String, Vec<PreloadSpec>> = HashMap::new();
        for spec in requested {
            let subs = out.entry(spec.name().to_string()).or_default();
            if let PreloadSpec::Nested(_, children) = spec {
                for child in children {
                    if !subs.contains(child) {
                        subs.push(child.clone());
                    }
                }
            }
        }
        out.retain(|name, _| valid_associations.contains(name));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use std::sync::Arc;

    fn valid(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn merges_duplicates_by_top_level_name() {
        let requested = vec![
            PreloadSpec::from("workspace"),
            PreloadSpec::nested("posts", vec![PreloadSpec::from("comments")]),
            PreloadSpec::from("posts"),
            PreloadSpec::nested("posts", vec![PreloadSpec::from("comments"), "author".into()]),
        ];
        let cleaned = Preloader::clean(&requested, &valid(&["workspace", "posts"]));
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned["workspace"], Vec::<PreloadSpec>::new());
        assert_eq!(
            cleaned["posts"],
            vec![PreloadSpec::from("comments"), PreloadSpec::from("author")]
        );
    }

    #[test]
    fn invalid_names_are_dropped() {
        let requested = vec![PreloadSpec::from("workspace"), PreloadSpec::from("bogus")];
        let cleaned = Preloader::clean(&requested, &valid(&["workspace"]));
        assert_eq!(cleaned.len(), 1);
        assert!(cleaned.contains_key("workspace"));
    }

    #[test]
    fn cleaning_is_idempotent_under_reordering() {
        let a = vec![
            PreloadSpec::nested("posts", vec!["comments".into()]),
            PreloadSpec::from("workspace"),
        ];
        let b = vec![
            PreloadSpec::from("workspace"),
            PreloadSpec::from("posts"),
            PreloadSpec::nested("posts", vec!["comments".into(), "comments".into()]),
        ];
        let valid = valid(&["workspace", "posts"]);
        assert_eq!(Preloader::clean(&a, &valid), Preloader::clean(&b, &valid));
    }

    #[tokio::test]
    async fn empty_batch_makes_no_call() {
        let store = Arc::new(MemoryStore::new());
        Preloader::preload(store.as_ref(), &[], &[PreloadSpec::from("workspace")], &valid(&["workspace"]))
            .await
            .unwrap();
        assert!(store.preload_calls().is_empty());
    }
}
