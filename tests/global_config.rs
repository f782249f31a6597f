//! The process-wide default configuration lives in its own test binary so no
//! other test observes it.

mod common;

use common::{people, summary, User};
use queryx::{apply_query_default, QueryError, QueryMappingConfig, QueryModel, QueryOptions};

#[test]
fn test_default_entry_point_uses_installed_global() {
    let config = QueryMappingConfig::new()
        .with_options(QueryOptions::strict())
        .for_model::<User>(|m| {
            m.property("name").map_from("login");
        });
    assert!(QueryMappingConfig::install_global(config).is_ok());
    assert!(QueryMappingConfig::global().is_strict());

    let query = QueryModel::new("login=='Jane'|age>=40").order_by("-age");
    let users = apply_query_default(people(), &query, true).unwrap();
    assert_eq!(summary(&users), vec![(3, "Bob", 40), (2, "Jane", 31)]);

    let err = apply_query_default(people(), &QueryModel::new("shoeSize==3"), false).unwrap_err();
    assert!(matches!(err, QueryError::UnresolvedFilterProperty(_)), "{err:?}");

    // Already installed.
    assert!(QueryMappingConfig::install_global(QueryMappingConfig::new()).is_err());
}
