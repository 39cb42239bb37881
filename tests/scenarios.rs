use permissible::{Error, IdentityCodec, Registry};

fn registry() -> Registry<String> {
    Registry::new(IdentityCodec::new(|id: &String| id.clone(), |s: &str| s.to_string()))
}

#[test]
fn exact_negation_beats_wildcard_grant() {
    let mut reg = registry();
    reg.assign_user_permissions(&"alice".to_string(), &["door.*", "-door.vault"]).unwrap();

    assert!(reg.user_has(&"alice".to_string(), "door.kitchen").unwrap());
    assert!(reg.user_has(&"alice".to_string(), "door.garage").unwrap());
    assert!(!reg.user_has(&"alice".to_string(), "door.vault").unwrap());
}

#[test]
fn wildcard_only_permission_does_not_cover_its_own_exact_node() {
    let mut reg = registry();
    reg.assign_group_permission("staff", "lab.*").unwrap();
    reg.assign_user_group(&"bob".to_string(), "staff").unwrap();

    assert!(!reg.user_has(&"bob".to_string(), "lab").unwrap());
    assert!(reg.user_has(&"bob".to_string(), "lab.bench1").unwrap());
}

#[test]
fn priority_reassignment_changes_which_group_answers() {
    let mut reg = registry();
    reg.assign_group_permission("restricted", "-area.use").unwrap();
    reg.assign_group_permission("open", "area.use").unwrap();
    reg.reassign_group_priority("restricted", "5").unwrap();
    reg.assign_user_groups(&"carol".to_string(), &["open", "restricted"]).unwrap();

    // restricted outranks open by priority, so it answers first.
    assert!(!reg.user_has(&"carol".to_string(), "area.use").unwrap());

    // demote restricted below open: open now answers first instead.
    reg.reassign_group_priority("restricted", "-5").unwrap();
    assert!(reg.user_has(&"carol".to_string(), "area.use").unwrap());
}

#[test]
fn argument_retrieval_falls_through_groups_with_no_coverage() {
    let mut reg = registry();
    reg.assign_group_permission("guests", "greet:hello").unwrap();
    reg.assign_group_permission("vip", "greet.named:hi there").unwrap();
    reg.reassign_group_priority("vip", "10").unwrap();
    reg.assign_user_groups(&"dan".to_string(), &["guests", "vip"]).unwrap();

    assert_eq!(reg.user_argument(&"dan".to_string(), "greet.named").unwrap().as_deref(), Some("hi there"));
    assert_eq!(reg.user_argument(&"dan".to_string(), "greet.other").unwrap().as_deref(), Some("hello"));
}

#[test]
fn circular_group_hierarchy_is_refused_and_state_is_unchanged() {
    let mut reg = registry();
    reg.assign_group_to_group("parent", "child").unwrap();

    let err = reg.assign_group_to_group("child", "parent").unwrap_err();
    assert!(matches!(err, Error::CircularGroupHierarchy { .. }));
    assert_eq!(reg.group_groups("child"), Vec::<String>::new());
    assert_eq!(reg.group_groups("parent"), vec!["child".to_string()]);
}

#[test]
fn multiline_argument_round_trips_through_groups_save_string() {
    let mut reg = registry();
    reg.assign_group_permission("poets", "poem:roses are red\nviolets are blue").unwrap();

    let saved = reg.groups_save_string();
    let mut reloaded = registry();
    reloaded.load_groups_from_string(&saved).unwrap();

    assert_eq!(
        reloaded.group_argument("poets", "poem").unwrap().as_deref(),
        Some("roses are red\nviolets are blue")
    );
}

#[test]
fn unknown_user_falls_back_to_default_group_but_unknown_group_never_does() {
    let mut reg = registry();
    reg.assign_default_permission("lobby.enter").unwrap();

    assert!(reg.user_has(&"stranger".to_string(), "lobby.enter").unwrap());
    assert!(!reg.group_has("no-such-group", "lobby.enter").unwrap());
}

#[test]
fn pruning_removes_groups_left_content_free_by_clearing_a_referenced_group() {
    let mut reg = registry();
    reg.assign_group_to_group("alias", "real").unwrap();
    assert_eq!(reg.group_groups("alias"), vec!["real".to_string()]);

    reg.clear_group("real");

    // alias lost its only reference and held no permissions of its own, so
    // the clear cascades into pruning it too.
    assert!(reg.group_names().is_empty());
}
