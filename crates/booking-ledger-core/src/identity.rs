//! Record linkage over booking contacts.
//!
//! Two records describe the same client when they share a normalized email or
//! a normalized phone; client membership is the transitive closure of that
//! relation. Records are kept in an index arena and the closure is computed
//! with a rank/path-compressed disjoint set, so the partition does not depend
//! on input order. Display attributes (name, primary email, phone order) are
//! first-seen and therefore do.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// One inbound contact, carrying an opaque appointment payload `A`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContactRecord<A> {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub appointment: A,
}

impl<A> ContactRecord<A> {
    #[must_use]
    pub fn normalized_email(&self) -> Option<String> {
        self.email.as_deref().and_then(normalize_email)
    }

    #[must_use]
    pub fn normalized_phone(&self) -> Option<String> {
        self.phone.as_deref().and_then(normalize_phone)
    }
}

/// Case-folds a trimmed email. Blank input is treated as absent.
#[must_use]
pub fn normalize_email(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_lowercase())
}

/// Strips whitespace, `-`, `(`, `)` and `+`. Input with nothing left is
/// treated as absent.
#[must_use]
pub fn normalize_phone(raw: &str) -> Option<String> {
    let stripped: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '(' | ')' | '+'))
        .collect();
    if stripped.is_empty() {
        return None;
    }
    Some(stripped)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct ClientId(pub u32);

impl Display for ClientId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalClient<A> {
    pub id: ClientId,
    /// Name of the first member record.
    pub name: String,
    /// Distinct emails in first-seen order; the first is primary.
    pub emails: Vec<String>,
    /// Distinct phone strings as entered, in first-seen order.
    pub phones: Vec<String>,
    /// Input positions of the member records, ascending.
    pub record_indices: Vec<usize>,
    pub appointments: Vec<A>,
}

impl<A> CanonicalClient<A> {
    #[must_use]
    pub fn primary_email(&self) -> Option<&str> {
        self.emails.first().map(String::as_str)
    }

    #[must_use]
    pub fn primary_phone(&self) -> Option<&str> {
        self.phones.first().map(String::as_str)
    }

    /// Normalized forms of [`Self::phones`], de-duplicated.
    #[must_use]
    pub fn normalized_phones(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.phones
            .iter()
            .filter_map(|phone| normalize_phone(phone))
            .filter(|phone| seen.insert(phone.clone()))
            .collect()
    }

    /// Transforms the appointment payloads, keeping identity fields intact.
    pub fn map_appointments<B>(self, f: impl FnMut(A) -> B) -> CanonicalClient<B> {
        CanonicalClient {
            id: self.id,
            name: self.name,
            emails: self.emails,
            phones: self.phones,
            record_indices: self.record_indices,
            appointments: self.appointments.into_iter().map(f).collect(),
        }
    }
}

/// Index-based union-find with union by rank and path halving.
#[derive(Debug, Clone)]
struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    fn find(&mut self, mut node: usize) -> usize {
        while self.parent[node] != node {
            let grandparent = self.parent[self.parent[node]];
            self.parent[node] = grandparent;
            node = grandparent;
        }
        node
    }

    /// Returns `false` when both nodes were already in one set.
    fn union(&mut self, left: usize, right: usize) -> bool {
        let left_root = self.find(left);
        let right_root = self.find(right);
        if left_root == right_root {
            return false;
        }

        match self.rank[left_root].cmp(&self.rank[right_root]) {
            std::cmp::Ordering::Less => self.parent[left_root] = right_root,
            std::cmp::Ordering::Greater => self.parent[right_root] = left_root,
            std::cmp::Ordering::Equal => {
                self.parent[right_root] = left_root;
                let rank = self.rank[left_root];
                self.rank[left_root] = rank.saturating_add(1);
            }
        }
        true
    }
}

/// Links `index` to the first record seen with `key`, or registers it.
fn link_on_key(
    owners: &mut BTreeMap<String, usize>,
    sets: &mut DisjointSet,
    key: Option<String>,
    index: usize,
    kind: &'static str,
) {
    let Some(key) = key else {
        return;
    };
    match owners.entry(key) {
        Entry::Occupied(owner) => {
            let owner = *owner.get();
            if sets.union(owner, index) {
                tracing::trace!(owner, index, kind, "merged records sharing an identifier");
            }
        }
        Entry::Vacant(slot) => {
            slot.insert(index);
        }
    }
}

struct ClusterBuilder<A> {
    name: String,
    emails: Vec<String>,
    email_keys: BTreeSet<String>,
    phones: Vec<String>,
    record_indices: Vec<usize>,
    appointments: Vec<A>,
}

impl<A> ClusterBuilder<A> {
    fn new(name: String) -> Self {
        Self {
            name,
            emails: Vec::new(),
            email_keys: BTreeSet::new(),
            phones: Vec::new(),
            record_indices: Vec::new(),
            appointments: Vec::new(),
        }
    }

    fn absorb(&mut self, index: usize, record: ContactRecord<A>) {
        if let (Some(email), Some(key)) = (record.email.as_deref(), record.normalized_email()) {
            if self.email_keys.insert(key) {
                self.emails.push(email.trim().to_string());
            }
        }
        if let Some(phone) = record.phone.as_deref() {
            let phone = phone.trim();
            if normalize_phone(phone).is_some() && !self.phones.iter().any(|seen| seen == phone) {
                self.phones.push(phone.to_string());
            }
        }
        self.record_indices.push(index);
        self.appointments.push(record.appointment);
    }

    fn finish(self, id: ClientId) -> CanonicalClient<A> {
        CanonicalClient {
            id,
            name: self.name,
            emails: self.emails,
            phones: self.phones,
            record_indices: self.record_indices,
            appointments: self.appointments,
        }
    }
}

/// Merges contact records into canonical clients.
///
/// Clients come back ordered by their first member record and numbered from
/// 1 in that order. Records with neither an email nor a phone each become
/// their own client.
#[must_use]
pub fn resolve_clients<A>(records: Vec<ContactRecord<A>>) -> Vec<CanonicalClient<A>> {
    let mut sets = DisjointSet::new(records.len());
    let mut email_owners: BTreeMap<String, usize> = BTreeMap::new();
    let mut phone_owners: BTreeMap<String, usize> = BTreeMap::new();

    for (index, record) in records.iter().enumerate() {
        link_on_key(
            &mut email_owners,
            &mut sets,
            record.normalized_email(),
            index,
            "email",
        );
        link_on_key(
            &mut phone_owners,
            &mut sets,
            record.normalized_phone(),
            index,
            "phone",
        );
    }

    let record_count = records.len();
    let mut slot_by_root: BTreeMap<usize, usize> = BTreeMap::new();
    let mut builders: Vec<ClusterBuilder<A>> = Vec::new();

    for (index, record) in records.into_iter().enumerate() {
        let root = sets.find(index);
        let slot = match slot_by_root.entry(root) {
            Entry::Occupied(slot) => *slot.get(),
            Entry::Vacant(slot) => {
                builders.push(ClusterBuilder::new(record.name.clone()));
                *slot.insert(builders.len() - 1)
            }
        };
        builders[slot].absorb(index, record);
    }

    tracing::debug!(
        records = record_count,
        clients = builders.len(),
        "resolved contact records into clients"
    );

    builders
        .into_iter()
        .zip(1_u32..)
        .map(|(builder, ordinal)| builder.finish(ClientId(ordinal)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(
        name: &str,
        email: Option<&str>,
        phone: Option<&str>,
        appointment: usize,
    ) -> ContactRecord<usize> {
        ContactRecord {
            name: name.to_string(),
            email: email.map(str::to_string),
            phone: phone.map(str::to_string),
            appointment,
        }
    }

    fn partition(clients: &[CanonicalClient<usize>]) -> BTreeSet<BTreeSet<usize>> {
        clients
            .iter()
            .map(|client| client.appointments.iter().copied().collect())
            .collect()
    }

    #[test]
    fn normalization_rules() {
        assert_eq!(normalize_email("  X@Test.COM "), Some("x@test.com".to_string()));
        assert_eq!(normalize_email("   "), None);
        assert_eq!(
            normalize_phone("+91 (912) 345-6789"),
            Some("919123456789".to_string())
        );
        assert_eq!(normalize_phone(" - ( ) + "), None);
    }

    #[test]
    fn transitive_merge_through_bridging_record() {
        let clients = resolve_clients(vec![
            record("A", Some("x@test.com"), None, 0),
            record("B", None, Some("9123456789"), 1),
            record("C", Some("x@test.com"), Some("9123456789"), 2),
        ]);

        assert_eq!(clients.len(), 1);
        let client = &clients[0];
        assert_eq!(client.id, ClientId(1));
        assert_eq!(client.name, "A");
        assert_eq!(client.emails, vec!["x@test.com".to_string()]);
        assert_eq!(client.phones, vec!["9123456789".to_string()]);
        assert_eq!(client.appointments, vec![0, 1, 2]);
        assert_eq!(client.record_indices, vec![0, 1, 2]);
    }

    #[test]
    fn identifier_less_records_stay_singletons() {
        let clients = resolve_clients(vec![
            record("Walk-in", None, None, 0),
            record("Walk-in", Some("  "), Some(""), 1),
        ]);
        assert_eq!(clients.len(), 2);
        assert_eq!(clients[0].id, ClientId(1));
        assert_eq!(clients[1].id, ClientId(2));
        assert!(clients[1].emails.is_empty());
        assert!(clients[1].phones.is_empty());
    }

    #[test]
    fn blank_phones_never_merge() {
        let clients = resolve_clients(vec![
            record("A", Some("a@test.com"), Some(" "), 0),
            record("B", Some("b@test.com"), Some(" "), 1),
        ]);
        assert_eq!(clients.len(), 2);
    }

    #[test]
    fn email_match_ignores_case_and_whitespace() {
        let clients = resolve_clients(vec![
            record("Asha", Some("Asha@Clinic.io"), None, 0),
            record("asha k", Some(" asha@clinic.io "), None, 1),
        ]);
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].primary_email(), Some("Asha@Clinic.io"));
        assert_eq!(clients[0].emails.len(), 1);
    }

    #[test]
    fn phone_formats_merge_but_originals_are_kept() {
        let clients = resolve_clients(vec![
            record("Ravi", None, Some("+91 98765-43210"), 0),
            record("Ravi S", None, Some("(91) 9876543210"), 1),
            record("Ravi", None, Some("+91 98765-43210"), 2),
        ]);
        assert_eq!(clients.len(), 1);
        assert_eq!(
            clients[0].phones,
            vec!["+91 98765-43210".to_string(), "(91) 9876543210".to_string()]
        );
        assert_eq!(clients[0].normalized_phones(), vec!["919876543210".to_string()]);
        assert_eq!(clients[0].primary_phone(), Some("+91 98765-43210"));
    }

    #[test]
    fn clients_are_ordered_by_first_member() {
        let clients = resolve_clients(vec![
            record("First", Some("one@test.com"), None, 0),
            record("Second", Some("two@test.com"), None, 1),
            record("First again", Some("one@test.com"), None, 2),
        ]);
        assert_eq!(clients.len(), 2);
        assert_eq!(clients[0].name, "First");
        assert_eq!(clients[0].appointments, vec![0, 2]);
        assert_eq!(clients[1].name, "Second");
    }

    #[test]
    fn late_bridge_merges_two_existing_clusters() {
        let clients = resolve_clients(vec![
            record("A", Some("a@test.com"), None, 0),
            record("B", None, Some("555"), 1),
            record("A2", Some("a@test.com"), None, 2),
            record("Bridge", Some("A@test.com"), Some("5-5-5"), 3),
        ]);
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].appointments, vec![0, 1, 2, 3]);
        assert_eq!(clients[0].emails, vec!["a@test.com".to_string()]);
        assert_eq!(clients[0].phones, vec!["555".to_string(), "5-5-5".to_string()]);
    }

    #[test]
    fn empty_input_resolves_to_no_clients() {
        let clients: Vec<CanonicalClient<usize>> = resolve_clients(Vec::new());
        assert!(clients.is_empty());
    }

    #[test]
    fn re_resolving_representatives_is_idempotent() {
        let first = resolve_clients(vec![
            record("A", Some("x@test.com"), None, 0),
            record("B", None, Some("9123456789"), 1),
            record("C", Some("x@test.com"), Some("9123456789"), 2),
            record("D", Some("d@test.com"), None, 3),
            record("E", None, None, 4),
            record("F", None, Some("777"), 5),
        ]);

        let representatives = first
            .iter()
            .map(|client| ContactRecord {
                name: client.name.clone(),
                email: client.primary_email().map(str::to_string),
                phone: client.primary_phone().map(str::to_string),
                appointment: client.id,
            })
            .collect();
        let second = resolve_clients(representatives);

        assert_eq!(second.len(), first.len());
        for (client, again) in first.iter().zip(&second) {
            assert_eq!(again.appointments, vec![client.id]);
            assert_eq!(again.name, client.name);
            assert_eq!(again.primary_email(), client.primary_email());
        }
    }

    #[test]
    fn map_appointments_preserves_identity() {
        let clients = resolve_clients(vec![record("A", Some("a@test.com"), None, 7)]);
        let mapped = clients
            .into_iter()
            .map(|client| client.map_appointments(|value| value.to_string()))
            .collect::<Vec<_>>();
        assert_eq!(mapped[0].appointments, vec!["7".to_string()]);
        assert_eq!(mapped[0].id, ClientId(1));
    }

    fn arbitrary_records() -> impl Strategy<Value = Vec<ContactRecord<usize>>> {
        let email = prop::option::of(prop::sample::select(vec![
            "a@test.com", "A@TEST.com ", "b@test.com", "c@test.com", "", "  ",
        ]));
        let phone = prop::option::of(prop::sample::select(vec![
            "111", "1-1-1", "+222", "(333)", "", " - ",
        ]));
        prop::collection::vec((email, phone), 0..24).prop_map(|pairs| {
            pairs
                .into_iter()
                .enumerate()
                .map(|(index, (email, phone))| ContactRecord {
                    name: format!("client {index}"),
                    email: email.map(str::to_string),
                    phone: phone.map(str::to_string),
                    appointment: index,
                })
                .collect()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(96))]

        #[test]
        fn prop_partition_is_permutation_invariant(
            (records, shuffled) in arbitrary_records()
                .prop_flat_map(|records| (Just(records.clone()), Just(records).prop_shuffle()))
        ) {
            let original = partition(&resolve_clients(records));
            let permuted = partition(&resolve_clients(shuffled));
            prop_assert_eq!(original, permuted);
        }

        #[test]
        fn prop_every_record_lands_in_exactly_one_client(records in arbitrary_records()) {
            let count = records.len();
            let clients = resolve_clients(records);
            let mut seen: Vec<usize> = clients
                .iter()
                .flat_map(|client| client.appointments.iter().copied())
                .collect();
            seen.sort_unstable();
            prop_assert_eq!(seen, (0..count).collect::<Vec<_>>());
        }

        #[test]
        fn prop_identifier_less_records_are_singletons(records in arbitrary_records()) {
            let bare: BTreeSet<usize> = records
                .iter()
                .filter(|record| record.normalized_email().is_none() && record.normalized_phone().is_none())
                .map(|record| record.appointment)
                .collect();
            for client in resolve_clients(records) {
                if client.appointments.iter().any(|index| bare.contains(index)) {
                    prop_assert_eq!(client.appointments.len(), 1);
                }
            }
        }
    }
}
