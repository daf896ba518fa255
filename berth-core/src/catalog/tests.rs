//! Integration tests for the catalog module

#[cfg(test)]
mod integration_tests {
    use std::cell::RefCell;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use crate::catalog::fixture::{CatalogFixture, WIRED_CONFIG};
    use crate::catalog::{
        list_collections, validate_collections, CatalogFetcher, CatalogResolver, CatalogSource,
        FetchError, LocalFetcher, Resolution, ResolverOptions, SourcePolicy,
        DEFAULT_CATALOG_SOURCE,
    };
    use crate::error::{BerthError, ErrorKind};
    use crate::version::Version;

    const CURRENT: Version = Version::new(0, 3, 0);

    fn names(entries: &[crate::catalog::CollectionEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    fn local_resolver() -> CatalogResolver<LocalFetcher> {
        CatalogResolver::new(LocalFetcher, ResolverOptions::new(CURRENT))
    }

    /// Records every fetch and serves a fixed local catalog
    struct RecordingFetcher {
        root: Option<PathBuf>,
        calls: RefCell<Vec<CatalogSource>>,
    }

    impl CatalogFetcher for RecordingFetcher {
        fn fetch(
            &self,
            source: &CatalogSource,
            _workdir: &Path,
            timeout: Duration,
        ) -> Result<PathBuf, FetchError> {
            self.calls.borrow_mut().push(source.clone());
            self.root.clone().ok_or(FetchError::FetchTimeout {
                target: source.clone_target().to_string(),
                timeout,
            })
        }
    }

    #[test]
    fn test_discovers_collections_at_any_depth() {
        let catalog = CatalogFixture::new();
        catalog.add_collection("collections/default", "default");
        catalog.add_collection("collections/java/backend", "java-backend");
        catalog.add_collection("collections/java/backend/kafka", "java-kafka");

        let discovery = list_collections(catalog.root(), &CURRENT).unwrap();
        assert_eq!(
            names(&discovery.entries),
            vec!["default", "java-backend", "java-kafka"]
        );
        assert!(discovery.skipped.is_empty());
    }

    #[test]
    fn test_missing_postcreate_fails_before_collections_are_examined() {
        let catalog = CatalogFixture::new();
        catalog.remove("shared/postcreate.sh");
        catalog.add_manifest("collections/broken", "name: Broken!\n", None);

        let err = list_collections(catalog.root(), &CURRENT).unwrap_err();
        match err {
            BerthError::MissingSharedAssets { missing, .. } => {
                assert_eq!(missing, vec!["postcreate.sh".to_string()]);
            }
            other => panic!("expected MissingSharedAssets, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_shared_directory_lists_every_asset() {
        let catalog = CatalogFixture::without_shared();
        catalog.add_collection("collections/default", "default");

        let err = validate_collections(catalog.root(), &CURRENT).unwrap_err();
        match err {
            BerthError::MissingSharedAssets { missing, .. } => assert_eq!(missing.len(), 3),
            other => panic!("expected MissingSharedAssets, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_catalog_is_not_an_error() {
        let catalog = CatalogFixture::new();
        let discovery = list_collections(catalog.root(), &CURRENT).unwrap();
        assert!(discovery.is_empty());

        std::fs::create_dir_all(catalog.root().join("collections")).unwrap();
        assert!(validate_collections(catalog.root(), &CURRENT)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_duplicate_names_fail_regardless_of_order() {
        for (first, second) in [
            ("collections/a-first", "collections/z-second"),
            ("collections/z-first", "collections/a-second/nested"),
        ] {
            let catalog = CatalogFixture::new();
            catalog.add_collection(first, "dup");
            catalog.add_collection(second, "dup");

            let err = list_collections(catalog.root(), &CURRENT).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::DuplicateCollectionName);
            let msg = err.to_string();
            assert!(msg.contains(first), "{msg}");
            assert!(msg.contains(second), "{msg}");
        }
    }

    #[test]
    fn test_duplicate_detected_even_when_one_copy_is_incomplete() {
        let catalog = CatalogFixture::new();
        catalog.add_collection("collections/one", "dup");
        catalog.add_manifest("collections/two", "name: dup\ndescription: Draft\n", None);

        let err = list_collections(catalog.root(), &CURRENT).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateCollectionName);
    }

    #[test]
    fn test_duplicate_detected_when_one_copy_has_a_bad_tag() {
        let catalog = CatalogFixture::new();
        catalog.add_collection("collections/one", "dup");
        catalog.add_manifest(
            "collections/two",
            "name: dup\ndescription: Second copy\ntags: [Not_A_Tag]\n",
            Some(WIRED_CONFIG),
        );

        let err = list_collections(catalog.root(), &CURRENT).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateCollectionName);
        let err = validate_collections(catalog.root(), &CURRENT).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateCollectionName);
    }

    #[test]
    fn test_duplicate_detected_when_one_copy_is_miswired() {
        let catalog = CatalogFixture::new();
        catalog.add_collection("collections/one", "dup");
        catalog.add_manifest(
            "collections/two",
            "name: dup\ndescription: Second copy\n",
            Some(r#"{ "postCreateCommand": "npm install" }"#),
        );

        let err = list_collections(catalog.root(), &CURRENT).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateCollectionName);

        let err = local_resolver()
            .select(Some(&catalog.descriptor()), "dup")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateCollectionName);
    }

    #[test]
    fn test_skipped_collection_keeps_its_declared_name() {
        let catalog = CatalogFixture::new();
        catalog.add_collection("collections/default", "default");
        catalog.add_manifest(
            "collections/node",
            "name: node\ndescription: Node\n",
            Some(r#"{ "postCreateCommand": "npm install" }"#),
        );

        let mut discovery = list_collections(catalog.root(), &CURRENT).unwrap();
        let skipped = discovery.take_skipped("node").unwrap();
        assert_eq!(skipped.reason.kind(), ErrorKind::InvalidManifest);

        let err = local_resolver()
            .select(Some(&catalog.descriptor()), "node")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidManifest);
    }

    #[test]
    fn test_asset_conflict_skipped_when_listing_reported_when_validating() {
        let catalog = CatalogFixture::new();
        catalog.add_collection("collections/default", "default");
        catalog.add_collection("collections/sneaky", "sneaky");
        catalog.write("collections/sneaky/scripts/functions.sh", "echo shadow\n");

        let mut discovery = list_collections(catalog.root(), &CURRENT).unwrap();
        assert_eq!(names(&discovery.entries), vec!["default"]);
        let skipped = discovery.take_skipped("sneaky").unwrap();
        assert_eq!(skipped.reason.kind(), ErrorKind::CollectionAssetConflict);

        let err = validate_collections(catalog.root(), &CURRENT).unwrap_err();
        match err {
            BerthError::CollectionAssetConflict {
                collection, files, ..
            } => {
                assert_eq!(collection, "sneaky");
                assert_eq!(files, vec!["scripts/functions.sh".to_string()]);
            }
            other => panic!("expected CollectionAssetConflict, got {other:?}"),
        }
    }

    #[test]
    fn test_incomplete_collection_policy() {
        let catalog = CatalogFixture::new();
        catalog.add_collection("collections/default", "default");
        catalog.add_manifest(
            "collections/draft",
            "name: draft\ndescription: Work in progress\n",
            None,
        );

        let discovery = list_collections(catalog.root(), &CURRENT).unwrap();
        assert_eq!(names(&discovery.entries), vec!["default"]);
        assert_eq!(discovery.skipped.len(), 1);

        let err = validate_collections(catalog.root(), &CURRENT).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IncompleteCollection);
    }

    #[test]
    fn test_invalid_manifest_skipped_when_listing() {
        let catalog = CatalogFixture::new();
        catalog.add_collection("collections/default", "default");
        catalog.add_manifest("collections/bad", "name: Bad_Name\ndescription: x\n", Some(WIRED_CONFIG));

        let discovery = list_collections(catalog.root(), &CURRENT).unwrap();
        assert_eq!(names(&discovery.entries), vec!["default"]);
        assert_eq!(discovery.skipped[0].name, None);
        assert_eq!(discovery.skipped[0].reason.kind(), ErrorKind::InvalidManifest);
    }

    #[test]
    fn test_min_version_gating_uses_supplied_version() {
        let catalog = CatalogFixture::new();
        catalog.add_manifest(
            "collections/future",
            "name: future\ndescription: Needs a newer tool\nminRequiredVersion: 1.0.0\n",
            Some(WIRED_CONFIG),
        );

        let old = list_collections(catalog.root(), &Version::new(0, 9, 9)).unwrap();
        assert!(old.entries.is_empty());
        assert_eq!(
            old.skipped[0].reason.kind(),
            ErrorKind::IncompatibleCollection
        );

        let new = list_collections(catalog.root(), &Version::new(1, 0, 0)).unwrap();
        assert_eq!(names(&new.entries), vec!["future"]);
    }

    #[test]
    fn test_select_returns_collection_files() {
        let catalog = CatalogFixture::new();
        catalog.add_collection("collections/java", "java");
        catalog.add_collection("collections/java/kafka", "java-kafka");
        catalog.write("collections/java/scripts/build.sh", "gradle build\n");

        let resolved = local_resolver()
            .select(Some(&catalog.descriptor()), "java")
            .unwrap();

        assert_eq!(resolved.entry.name, "java");
        assert_eq!(
            resolved.files,
            vec![
                PathBuf::from("Dockerfile"),
                PathBuf::from("devcontainer.json"),
                PathBuf::from("scripts/build.sh"),
            ]
        );
        assert_eq!(resolved.collection_dir(), catalog.root().join("collections/java"));
        assert!(resolved.shared_assets().iter().all(|p| p.is_file()));
    }

    #[test]
    fn test_collection_not_found_names_the_request() {
        let catalog = CatalogFixture::new();
        catalog.add_collection("collections/default", "default");

        let err = local_resolver()
            .select(Some(&catalog.descriptor()), "smarsh-java-backend")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CollectionNotFound);
        assert!(err.to_string().contains("smarsh-java-backend"));
    }

    #[test]
    fn test_direct_selection_reports_why_a_collection_was_skipped() {
        let catalog = CatalogFixture::new();
        catalog.add_collection("collections/default", "default");
        catalog.add_manifest(
            "collections/future",
            "name: future\ndescription: Needs a newer tool\nminRequiredVersion: 9.0.0\n",
            Some(WIRED_CONFIG),
        );

        let err = local_resolver()
            .select(Some(&catalog.descriptor()), "future")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IncompatibleCollection);
    }

    #[test]
    fn test_selecting_from_empty_catalog_is_no_collections_found() {
        let catalog = CatalogFixture::new();
        let err = local_resolver()
            .select(Some(&catalog.descriptor()), "default")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoCollectionsFound);
    }

    #[test]
    fn test_browse_without_entry_name() {
        let catalog = CatalogFixture::new();
        catalog.add_collection("collections/default", "default");

        match local_resolver()
            .resolve(Some(&catalog.descriptor()), None)
            .unwrap()
        {
            Resolution::Browse(listing) => {
                assert_eq!(names(&listing.discovery.entries), vec!["default"]);
            }
            Resolution::Selected(_) => panic!("expected a listing"),
        }
    }

    #[test]
    fn test_default_source_is_substituted() {
        let catalog = CatalogFixture::new();
        catalog.add_collection("collections/default", "default");
        let fetcher = RecordingFetcher {
            root: Some(catalog.root().to_path_buf()),
            calls: RefCell::new(Vec::new()),
        };

        let resolver = CatalogResolver::new(fetcher, ResolverOptions::new(CURRENT));
        resolver.select(None, "default").unwrap();

        let fetcher = &resolver.fetcher_calls();
        assert_eq!(fetcher.len(), 1);
        assert_eq!(fetcher[0].clone_target(), DEFAULT_CATALOG_SOURCE);
    }

    #[test]
    fn test_source_required_fails_before_fetch() {
        let fetcher = RecordingFetcher {
            root: None,
            calls: RefCell::new(Vec::new()),
        };
        let mut options = ResolverOptions::new(CURRENT);
        options.source_policy = SourcePolicy::RequireExplicit;
        let resolver = CatalogResolver::new(fetcher, options);

        let err = resolver.select(None, "default").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceRequired);
        assert!(resolver.fetcher_calls().is_empty());
    }

    #[test]
    fn test_fetch_failures_pass_through() {
        let fetcher = RecordingFetcher {
            root: None,
            calls: RefCell::new(Vec::new()),
        };
        let resolver = CatalogResolver::new(fetcher, ResolverOptions::new(CURRENT));

        let err = resolver
            .browse(Some("git@github.com:org/catalog.git@v2.0"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FetchTimeout);
        assert_eq!(resolver.fetcher_calls()[0].reference(), Some("v2.0"));
    }

    #[test]
    fn test_invalid_descriptor_never_fetches() {
        let fetcher = RecordingFetcher {
            root: None,
            calls: RefCell::new(Vec::new()),
        };
        let resolver = CatalogResolver::new(fetcher, ResolverOptions::new(CURRENT));

        let err = resolver.browse(Some("git@github.com:")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSourceFormat);
        assert!(resolver.fetcher_calls().is_empty());
    }

    impl CatalogResolver<RecordingFetcher> {
        fn fetcher_calls(&self) -> Vec<CatalogSource> {
            self.fetcher().calls.borrow().clone()
        }
    }
}
