use contactlink_core::db::open_db_in_memory;
use contactlink_core::identity::locator::locate;
use contactlink_core::{
    identify_contact, Contact, ContactFilter, ContactId, ContactRepository, IdentifyError,
    IdentifyRequest, IdentityService, LinkPrecedence, LinkUpdate, NewContact, RepoError,
    RepoResult, SqliteContactRepository,
};
use rusqlite::{params, Connection};
use std::cell::Cell;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Row {
    id: ContactId,
    email: Option<String>,
    phone_number: Option<String>,
    linked_id: Option<ContactId>,
    link_precedence: String,
}

fn rows(conn: &Connection) -> Vec<Row> {
    let mut stmt = conn
        .prepare(
            "SELECT id, email, phone_number, linked_id, link_precedence
             FROM contacts
             WHERE deleted_at IS NULL
             ORDER BY id ASC;",
        )
        .unwrap();
    stmt.query_map([], |row| {
        Ok(Row {
            id: row.get(0)?,
            email: row.get(1)?,
            phone_number: row.get(2)?,
            linked_id: row.get(3)?,
            link_precedence: row.get(4)?,
        })
    })
    .unwrap()
    .map(Result::unwrap)
    .collect()
}

fn row(conn: &Connection, id: ContactId) -> Row {
    rows(conn)
        .into_iter()
        .find(|row| row.id == id)
        .expect("contact row should exist")
}

fn assert_no_chains(conn: &Connection) {
    let all = rows(conn);
    for contact in all.iter().filter(|row| row.link_precedence == "secondary") {
        let target = contact.linked_id.expect("secondary must be linked");
        let parent = all
            .iter()
            .find(|row| row.id == target)
            .expect("linked contact must exist");
        assert_eq!(
            parent.link_precedence, "primary",
            "contact {} links to non-primary {}",
            contact.id, target
        );
        assert_eq!(parent.linked_id, None);
    }
}

fn set_created_at(conn: &Connection, id: ContactId, created_at: i64) {
    conn.execute(
        "UPDATE contacts SET created_at = ?1 WHERE id = ?2;",
        params![created_at, id],
    )
    .unwrap();
}

#[test]
fn new_identity_creates_single_primary() {
    let mut conn = open_db_in_memory().unwrap();

    let response =
        identify_contact(&mut conn, Some("doc@example.com"), Some("1234567890")).unwrap();
    let view = response.contact;
    assert_eq!(view.emails, vec!["doc@example.com".to_string()]);
    assert_eq!(view.phone_numbers, vec!["1234567890".to_string()]);
    assert!(view.secondary_contact_ids.is_empty());

    let all = rows(&conn);
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, view.primary_contact_id);
    assert_eq!(all[0].link_precedence, "primary");
}

#[test]
fn redundant_submission_is_idempotent() {
    let mut conn = open_db_in_memory().unwrap();

    let first = identify_contact(&mut conn, Some("doc@example.com"), Some("123")).unwrap();
    let second = identify_contact(&mut conn, Some("doc@example.com"), Some("123")).unwrap();

    assert_eq!(first, second);
    assert_eq!(rows(&conn).len(), 1);
}

#[test]
fn email_match_with_new_phone_adds_secondary_holding_only_the_phone() {
    let mut conn = open_db_in_memory().unwrap();
    let primary_id = identify_contact(&mut conn, Some("doc@example.com"), Some("1234567890"))
        .unwrap()
        .contact
        .primary_contact_id;

    let view = identify_contact(&mut conn, Some("doc@example.com"), Some("9876543210"))
        .unwrap()
        .contact;

    assert_eq!(view.primary_contact_id, primary_id);
    assert_eq!(view.emails, vec!["doc@example.com".to_string()]);
    assert_eq!(
        view.phone_numbers,
        vec!["1234567890".to_string(), "9876543210".to_string()]
    );
    assert_eq!(view.secondary_contact_ids.len(), 1);

    let secondary = row(&conn, view.secondary_contact_ids[0]);
    assert_eq!(secondary.link_precedence, "secondary");
    assert_eq!(secondary.linked_id, Some(primary_id));
    assert_eq!(secondary.email, None);
    assert_eq!(secondary.phone_number.as_deref(), Some("9876543210"));
}

#[test]
fn phone_match_with_new_email_adds_secondary() {
    let mut conn = open_db_in_memory().unwrap();
    identify_contact(&mut conn, Some("doc@example.com"), Some("1234567890")).unwrap();

    let view = identify_contact(&mut conn, Some("doc2@example.com"), Some("1234567890"))
        .unwrap()
        .contact;

    assert_eq!(
        view.emails,
        vec!["doc@example.com".to_string(), "doc2@example.com".to_string()]
    );
    assert_eq!(view.phone_numbers, vec!["1234567890".to_string()]);
    assert_eq!(view.secondary_contact_ids.len(), 1);
    assert_eq!(rows(&conn).len(), 2);
}

#[test]
fn single_identifier_lookup_returns_cluster_without_writes() {
    let mut conn = open_db_in_memory().unwrap();
    let full = identify_contact(&mut conn, Some("doc@example.com"), Some("111")).unwrap();
    identify_contact(&mut conn, Some("doc@example.com"), Some("222")).unwrap();

    let by_phone = identify_contact(&mut conn, None, Some("222")).unwrap().contact;
    assert_eq!(by_phone.primary_contact_id, full.contact.primary_contact_id);
    assert_eq!(by_phone.phone_numbers.len(), 2);
    assert_eq!(rows(&conn).len(), 2);
}

#[test]
fn values_known_on_different_contacts_are_redundant() {
    let mut conn = open_db_in_memory().unwrap();
    identify_contact(&mut conn, Some("a@example.com"), Some("111")).unwrap();
    identify_contact(&mut conn, Some("b@example.com"), Some("111")).unwrap();
    identify_contact(&mut conn, Some("a@example.com"), Some("222")).unwrap();
    assert_eq!(rows(&conn).len(), 3);

    identify_contact(&mut conn, Some("b@example.com"), Some("222")).unwrap();
    assert_eq!(rows(&conn).len(), 3);
}

#[test]
fn merge_keeps_older_primary() {
    let mut conn = open_db_in_memory().unwrap();
    let c1 = identify_contact(&mut conn, Some("doc@example.com"), Some("1234567890"))
        .unwrap()
        .contact
        .primary_contact_id;
    let c2 = identify_contact(&mut conn, Some("doc2@example.com"), Some("9876543210"))
        .unwrap()
        .contact
        .primary_contact_id;
    assert_ne!(c1, c2);

    let view = identify_contact(&mut conn, Some("doc@example.com"), Some("9876543210"))
        .unwrap()
        .contact;

    assert_eq!(view.primary_contact_id, c1);
    assert_eq!(
        view.emails,
        vec!["doc@example.com".to_string(), "doc2@example.com".to_string()]
    );
    assert_eq!(
        view.phone_numbers,
        vec!["1234567890".to_string(), "9876543210".to_string()]
    );
    assert_eq!(view.secondary_contact_ids, vec![c2]);

    assert_eq!(row(&conn, c1).link_precedence, "primary");
    let demoted = row(&conn, c2);
    assert_eq!(demoted.link_precedence, "secondary");
    assert_eq!(demoted.linked_id, Some(c1));
    assert_eq!(rows(&conn).len(), 2);
}

#[test]
fn merge_follows_creation_time_not_insertion_order() {
    let mut conn = open_db_in_memory().unwrap();
    let c1 = identify_contact(&mut conn, Some("a@example.com"), Some("111"))
        .unwrap()
        .contact
        .primary_contact_id;
    let c2 = identify_contact(&mut conn, Some("b@example.com"), Some("222"))
        .unwrap()
        .contact
        .primary_contact_id;
    set_created_at(&conn, c1, 2_000);
    set_created_at(&conn, c2, 1_000);

    let view = identify_contact(&mut conn, Some("a@example.com"), Some("222"))
        .unwrap()
        .contact;

    assert_eq!(view.primary_contact_id, c2);
    assert_eq!(view.emails[0], "b@example.com");
    assert_eq!(row(&conn, c1).linked_id, Some(c2));
}

#[test]
fn merge_flattens_secondaries_of_demoted_primary() {
    let mut conn = open_db_in_memory().unwrap();
    let c1 = identify_contact(&mut conn, Some("a@example.com"), Some("111"))
        .unwrap()
        .contact
        .primary_contact_id;
    let c2 = identify_contact(&mut conn, Some("b@example.com"), Some("222"))
        .unwrap()
        .contact
        .primary_contact_id;
    let c3 = identify_contact(&mut conn, Some("b@example.com"), Some("333"))
        .unwrap()
        .contact
        .secondary_contact_ids[0];
    assert_eq!(row(&conn, c3).linked_id, Some(c2));

    let view = identify_contact(&mut conn, Some("a@example.com"), Some("333"))
        .unwrap()
        .contact;

    assert_eq!(view.primary_contact_id, c1);
    assert_eq!(view.secondary_contact_ids, vec![c2, c3]);
    assert_eq!(row(&conn, c2).linked_id, Some(c1));
    assert_eq!(row(&conn, c3).linked_id, Some(c1));
    assert_no_chains(&conn);
}

#[test]
fn locate_returns_full_cluster_from_any_member_identifier() {
    let mut conn = open_db_in_memory().unwrap();
    identify_contact(&mut conn, Some("a@example.com"), Some("111")).unwrap();
    identify_contact(&mut conn, Some("a@example.com"), Some("222")).unwrap();
    identify_contact(&mut conn, Some("c@example.com"), Some("222")).unwrap();
    identify_contact(&mut conn, Some("other@example.com"), Some("999")).unwrap();

    let repo = SqliteContactRepository::try_new(&conn).unwrap();
    let probes = [
        (Some("a@example.com"), None),
        (None, Some("111")),
        (None, Some("222")),
        (Some("c@example.com"), None),
    ];
    for (email, phone) in probes {
        let request = IdentifyRequest::new(email, phone).unwrap();
        let cluster = locate(&repo, &request).unwrap();
        assert_eq!(cluster.len(), 3, "probe {email:?}/{phone:?}");
        assert!(cluster
            .iter()
            .all(|contact| contact.email.as_deref() != Some("other@example.com")));
    }
}

#[test]
fn soft_deleted_contacts_do_not_match() {
    let mut conn = open_db_in_memory().unwrap();
    let first = identify_contact(&mut conn, Some("a@example.com"), Some("111"))
        .unwrap()
        .contact
        .primary_contact_id;
    SqliteContactRepository::try_new(&conn)
        .unwrap()
        .soft_delete_contact(first)
        .unwrap();

    let view = identify_contact(&mut conn, Some("a@example.com"), Some("111"))
        .unwrap()
        .contact;
    assert_ne!(view.primary_contact_id, first);
    assert!(view.secondary_contact_ids.is_empty());
}

#[test]
fn deleting_a_primary_hands_the_cluster_to_its_oldest_secondary() {
    let mut conn = open_db_in_memory().unwrap();
    let primary_id = identify_contact(&mut conn, Some("a@x.io"), Some("111"))
        .unwrap()
        .contact
        .primary_contact_id;
    let by_email = identify_contact(&mut conn, Some("b@x.io"), Some("111"))
        .unwrap()
        .contact
        .secondary_contact_ids[0];
    let by_phone = identify_contact(&mut conn, Some("a@x.io"), Some("222"))
        .unwrap()
        .contact
        .secondary_contact_ids[1];
    assert_eq!(row(&conn, by_email).phone_number, None);
    assert_eq!(row(&conn, by_phone).email, None);

    SqliteContactRepository::try_new(&conn)
        .unwrap()
        .soft_delete_contact(primary_id)
        .unwrap();

    assert_eq!(row(&conn, by_email).link_precedence, "primary");
    assert_eq!(row(&conn, by_phone).linked_id, Some(by_email));
    assert_no_chains(&conn);

    let view = identify_contact(&mut conn, Some("b@x.io"), None)
        .unwrap()
        .contact;
    assert_eq!(view.primary_contact_id, by_email);
    assert_eq!(view.emails, vec!["b@x.io".to_string()]);
    assert_eq!(view.phone_numbers, vec!["222".to_string()]);
    assert_eq!(view.secondary_contact_ids, vec![by_phone]);
}

#[test]
fn orphaned_secondaries_elect_the_oldest_through_identify() {
    let mut conn = open_db_in_memory().unwrap();
    let primary_id = identify_contact(&mut conn, Some("a@x.io"), Some("111"))
        .unwrap()
        .contact
        .primary_contact_id;
    identify_contact(&mut conn, Some("b@x.io"), Some("111")).unwrap();
    identify_contact(&mut conn, Some("a@x.io"), Some("222")).unwrap();
    let secondaries: Vec<ContactId> = rows(&conn)
        .into_iter()
        .filter(|row| row.link_precedence == "secondary")
        .map(|row| row.id)
        .collect();
    assert_eq!(secondaries.len(), 2);

    // Bypass the repository handover to leave both secondaries orphaned.
    conn.execute(
        "UPDATE contacts SET deleted_at = 1 WHERE id = ?1;",
        params![primary_id],
    )
    .unwrap();

    let view = identify_contact(&mut conn, Some("b@x.io"), None)
        .unwrap()
        .contact;
    assert_eq!(view.primary_contact_id, secondaries[0]);
    assert_eq!(view.secondary_contact_ids, vec![secondaries[1]]);
    assert_eq!(view.phone_numbers, vec!["222".to_string()]);

    assert_eq!(row(&conn, secondaries[0]).link_precedence, "primary");
    assert_eq!(row(&conn, secondaries[0]).linked_id, None);
    assert_eq!(row(&conn, secondaries[1]).linked_id, Some(secondaries[0]));
    assert_no_chains(&conn);
}

#[test]
fn identifiers_match_exactly_without_trimming() {
    let mut conn = open_db_in_memory().unwrap();
    let first = identify_contact(&mut conn, Some("a@x.io"), None)
        .unwrap()
        .contact
        .primary_contact_id;

    let view = identify_contact(&mut conn, Some(" a@x.io "), None)
        .unwrap()
        .contact;
    assert_ne!(view.primary_contact_id, first);
    assert_eq!(view.emails, vec![" a@x.io ".to_string()]);
    assert_eq!(rows(&conn).len(), 2);
}

#[test]
fn no_multi_level_chains_after_mixed_sequence() {
    let mut conn = open_db_in_memory().unwrap();
    let submissions = [
        (Some("a@example.com"), Some("111")),
        (Some("b@example.com"), Some("222")),
        (Some("c@example.com"), Some("333")),
        (Some("b@example.com"), Some("444")),
        (Some("c@example.com"), Some("555")),
        (Some("d@example.com"), Some("444")),
        (Some("a@example.com"), Some("555")),
        (Some("d@example.com"), Some("111")),
        (None, Some("666")),
        (Some("e@example.com"), None),
        (Some("e@example.com"), Some("666")),
        (Some("e@example.com"), Some("222")),
    ];
    for (email, phone) in submissions {
        identify_contact(&mut conn, email, phone).unwrap();
        assert_no_chains(&conn);
    }

    let primaries = rows(&conn)
        .into_iter()
        .filter(|row| row.link_precedence == "primary")
        .count();
    assert_eq!(primaries, 1);

    let view = identify_contact(&mut conn, Some("a@example.com"), None)
        .unwrap()
        .contact;
    assert_eq!(view.emails.len(), 5);
    assert_eq!(view.phone_numbers.len(), 6);
}

#[test]
fn identify_contact_rejects_missing_identifiers() {
    let mut conn = open_db_in_memory().unwrap();

    let err = identify_contact(&mut conn, Some(""), Some("")).unwrap_err();
    assert!(matches!(err, IdentifyError::InvalidInput));
    assert!(err.is_user_correctable());
    assert!(rows(&conn).is_empty());
}

/// Repository that counts calls and never touches storage.
#[derive(Default)]
struct CountingRepository {
    calls: Cell<usize>,
}

impl CountingRepository {
    fn hit(&self) -> RepoResult<()> {
        self.calls.set(self.calls.get() + 1);
        Err(RepoError::InvalidData("storage should not be reached".to_string()))
    }
}

impl ContactRepository for CountingRepository {
    fn find_contacts(&self, _filter: &ContactFilter) -> RepoResult<Vec<Contact>> {
        self.hit().map(|_| Vec::new())
    }

    fn get_contact(&self, _id: ContactId) -> RepoResult<Option<Contact>> {
        self.hit().map(|_| None)
    }

    fn create_contact(&self, _contact: &NewContact) -> RepoResult<Contact> {
        Err(self.hit().unwrap_err())
    }

    fn update_link(&self, _id: ContactId, _update: &LinkUpdate) -> RepoResult<()> {
        self.hit()
    }

    fn soft_delete_contact(&self, _id: ContactId) -> RepoResult<()> {
        self.hit()
    }
}

#[test]
fn validation_happens_before_any_storage_access() {
    let repo = CountingRepository::default();
    let service = IdentityService::new(&repo);

    let err = service.identify(Some(""), None).unwrap_err();
    assert!(matches!(err, IdentifyError::InvalidInput));
    assert_eq!(repo.calls.get(), 0);

    let err = service.identify(Some("a@example.com"), None).unwrap_err();
    assert!(matches!(err, IdentifyError::StoreUnavailable(_)));
    assert!(!err.is_user_correctable());
    assert_eq!(repo.calls.get(), 1);
}

/// Delegates to SQLite but refuses to relink one contact.
struct RelinkFailingRepository<'conn> {
    inner: SqliteContactRepository<'conn>,
    fail_on: ContactId,
}

impl ContactRepository for RelinkFailingRepository<'_> {
    fn find_contacts(&self, filter: &ContactFilter) -> RepoResult<Vec<Contact>> {
        self.inner.find_contacts(filter)
    }

    fn get_contact(&self, id: ContactId) -> RepoResult<Option<Contact>> {
        self.inner.get_contact(id)
    }

    fn create_contact(&self, contact: &NewContact) -> RepoResult<Contact> {
        self.inner.create_contact(contact)
    }

    fn update_link(&self, id: ContactId, update: &LinkUpdate) -> RepoResult<()> {
        if id == self.fail_on {
            return Err(RepoError::NotFound(id));
        }
        self.inner.update_link(id, update)
    }

    fn soft_delete_contact(&self, id: ContactId) -> RepoResult<()> {
        self.inner.soft_delete_contact(id)
    }
}

#[test]
fn merge_failure_is_reported_and_rolled_back_with_the_transaction() {
    let mut conn = open_db_in_memory().unwrap();
    let c1 = identify_contact(&mut conn, Some("a@example.com"), Some("111"))
        .unwrap()
        .contact
        .primary_contact_id;
    let c2 = identify_contact(&mut conn, Some("b@example.com"), Some("222"))
        .unwrap()
        .contact
        .primary_contact_id;
    let c3 = identify_contact(&mut conn, Some("b@example.com"), Some("333"))
        .unwrap()
        .contact
        .secondary_contact_ids[0];

    {
        let tx = conn.transaction().unwrap();
        let repo = RelinkFailingRepository {
            inner: SqliteContactRepository::try_new(&tx).unwrap(),
            fail_on: c3,
        };
        let err = IdentityService::new(repo)
            .identify(Some("a@example.com"), Some("333"))
            .unwrap_err();
        assert!(matches!(err, IdentifyError::MergeFailure { contact_id } if contact_id == c3));
    }

    assert_eq!(row(&conn, c1).link_precedence, "primary");
    assert_eq!(row(&conn, c2).link_precedence, "primary");
    assert_eq!(row(&conn, c3).linked_id, Some(c2));
    assert_eq!(rows(&conn).len(), 3);
}

#[test]
fn repository_precedence_matches_view_roles() {
    let mut conn = open_db_in_memory().unwrap();
    identify_contact(&mut conn, Some("a@example.com"), Some("111")).unwrap();
    let view = identify_contact(&mut conn, Some("a@example.com"), Some("222"))
        .unwrap()
        .contact;
    assert_eq!(view.secondary_contact_ids.len(), 1);

    let repo = SqliteContactRepository::try_new(&conn).unwrap();
    let primary = repo.get_contact(view.primary_contact_id).unwrap().unwrap();
    assert_eq!(primary.link_precedence, LinkPrecedence::Primary);
    for id in view.secondary_contact_ids {
        let secondary = repo.get_contact(id).unwrap().unwrap();
        assert_eq!(secondary.link_precedence, LinkPrecedence::Secondary);
        assert_eq!(secondary.linked_id, Some(primary.id));
    }
}
