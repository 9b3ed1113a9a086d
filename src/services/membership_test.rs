use super::*;
use crate::state::test_helpers::MockOracle;

#[test]
fn project_role_parse_known_values() {
    assert_eq!(ProjectRole::parse("admin"), Some(ProjectRole::Admin));
    assert_eq!(ProjectRole::parse("member"), Some(ProjectRole::Member));
    assert_eq!(ProjectRole::parse("viewer"), Some(ProjectRole::Viewer));
    assert_eq!(ProjectRole::parse("owner"), None);
    assert_eq!(ProjectRole::parse("Admin"), None);
}

#[test]
fn project_role_as_str_matches_parse() {
    for role in [ProjectRole::Admin, ProjectRole::Member, ProjectRole::Viewer] {
        assert_eq!(ProjectRole::parse(role.as_str()), Some(role));
    }
}

#[tokio::test]
async fn authorize_grants_members() {
    let oracle = MockOracle::default();
    let user = Uuid::new_v4();
    let project = Uuid::new_v4();
    oracle.grant(user, project);

    assert_eq!(authorize(&oracle, user, project).await, Ok(ProjectRole::Member));
}

#[tokio::test]
async fn authorize_denies_non_members() {
    let oracle = MockOracle::default();
    let project = Uuid::new_v4();

    assert_eq!(
        authorize(&oracle, Uuid::new_v4(), project).await,
        Err(RealtimeError::AccessDenied(project))
    );
}

#[tokio::test]
async fn authorize_fails_closed_when_oracle_errors() {
    let oracle = MockOracle::default();
    let user = Uuid::new_v4();
    let project = Uuid::new_v4();
    oracle.grant(user, project);
    oracle.set_failing(true);

    assert_eq!(authorize(&oracle, user, project).await, Err(RealtimeError::AccessDenied(project)));
}

#[tokio::test]
async fn authorize_never_caches() {
    let oracle = MockOracle::default();
    let user = Uuid::new_v4();
    let project = Uuid::new_v4();
    oracle.grant(user, project);

    assert!(authorize(&oracle, user, project).await.is_ok());
    oracle.revoke(user, project);
    assert!(authorize(&oracle, user, project).await.is_err());
    assert_eq!(oracle.calls(), 2);
}
