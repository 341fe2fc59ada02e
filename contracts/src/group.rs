//! # Threshold Groups
//!
//! A group is a threshold over members, where each member is either an
//! identity or another group:
//!
//! ```text
//! { threshold: 1, members: [ D, { threshold: 1, members: [ E, F ] } ] }
//! ```
//!
//! Groups authorize calls for controllers and recovery. A call is
//! authorized by a group when
//!
//! 1. the signer identities satisfy the threshold at every level, and
//! 2. every listed signer proves, through the witness oracle, that it holds
//!    the key at the index it named.
//!
//! One bad signer fails the whole call; there is no partial credit.
//!
//! ## Signer pool policy
//!
//! With [`SignerPolicy::Shared`] a signer identity counts for every slot it
//! appears in, at every nesting level. With [`SignerPolicy::Partitioned`]
//! each signer identity may fill at most one leaf slot across the whole
//! tree, so `{2, [A, {1, [A, B]}]}` needs both A and B.
//!
//! ## Wire format
//!
//! ```text
//! varuint(n) ‖ n × varbytes(member) ‖ varuint(threshold)
//! ```
//!
//! A member beginning with `did:` is an identity; anything else is a nested
//! serialized group. Decoding rejects nesting deeper than
//! [`MAX_GROUP_DEPTH`] levels.

use serde::Serialize;
use std::cell::Cell;
use std::collections::{BTreeSet, HashSet};

use sovid_protocol::codec::{Sink, Source};
use sovid_protocol::config::MAX_GROUP_DEPTH;
use sovid_protocol::host::NativeContext;

use crate::error::{IdentityError, IdentityResult};
use crate::keys::{self, to_index, KeyUsage};
use crate::state::{self, IdentityKey, IdentityState};

/// Prefix that marks an identity member in the serialized form.
const IDENTITY_PREFIX: &[u8] = b"did:";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A group member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Member {
    Identity(#[serde(serialize_with = "crate::document::as_utf8")] Vec<u8>),
    Group(Box<Group>),
}

/// A weighted-threshold group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
    pub threshold: usize,
    pub members: Vec<Member>,
}

/// A claim that `id`'s key at `index` signed the current call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signer {
    pub id: Vec<u8>,
    pub index: u32,
}

/// How signer identities are counted across nested levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SignerPolicy {
    /// Every signer is available to every slot at every level.
    #[default]
    Shared,
    /// Each signer fills at most one leaf slot.
    Partitioned,
}

impl Member {
    pub fn identity(id: impl Into<Vec<u8>>) -> Self {
        Member::Identity(id.into())
    }

    pub fn group(group: Group) -> Self {
        Member::Group(Box::new(group))
    }
}

// ---------------------------------------------------------------------------
// Group: structure and codec
// ---------------------------------------------------------------------------

impl Group {
    pub fn new(threshold: usize, members: Vec<Member>) -> Self {
        Self { threshold, members }
    }

    /// Nesting depth; a flat group has depth 1.
    pub fn depth(&self) -> usize {
        1 + self
            .members
            .iter()
            .map(|m| match m {
                Member::Identity(_) => 0,
                Member::Group(g) => g.depth(),
            })
            .max()
            .unwrap_or(0)
    }

    /// Check `1 ≤ threshold ≤ len(members)` at every level and the depth
    /// limit. Does not touch storage.
    pub fn check_structure(&self) -> IdentityResult<()> {
        if self.depth() > MAX_GROUP_DEPTH {
            return Err(IdentityError::ValidationFailed(format!(
                "group nesting exceeds {MAX_GROUP_DEPTH} levels"
            )));
        }
        self.check_thresholds()
    }

    fn check_thresholds(&self) -> IdentityResult<()> {
        if self.members.is_empty() {
            return Err(IdentityError::ValidationFailed("group has no members".into()));
        }
        if self.threshold == 0 || self.threshold > self.members.len() {
            return Err(IdentityError::ValidationFailed(format!(
                "threshold {} outside 1..={}",
                self.threshold,
                self.members.len()
            )));
        }
        for member in &self.members {
            if let Member::Group(g) = member {
                g.check_thresholds()?;
            }
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut sink = Sink::new();
        sink.write_var_uint(self.members.len() as u64);
        for member in &self.members {
            match member {
                Member::Identity(id) => sink.write_var_bytes(id),
                Member::Group(g) => sink.write_var_bytes(&g.to_bytes()),
            };
        }
        sink.write_var_uint(self.threshold as u64);
        sink.into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> IdentityResult<Self> {
        Self::decode_at(bytes, 1)
    }

    fn decode_at(bytes: &[u8], depth: usize) -> IdentityResult<Self> {
        if depth > MAX_GROUP_DEPTH {
            return Err(IdentityError::ValidationFailed(format!(
                "group nesting exceeds {MAX_GROUP_DEPTH} levels"
            )));
        }
        let mut src = Source::new(bytes);
        let count = src.read_var_uint()?;
        if count > src.remaining() as u64 {
            return Err(IdentityError::ValidationFailed(format!(
                "member count {count} exceeds input"
            )));
        }

        let mut members = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let raw = src.read_var_bytes()?;
            if raw.starts_with(IDENTITY_PREFIX) {
                members.push(Member::Identity(raw.to_vec()));
            } else {
                members.push(Member::group(Self::decode_at(raw, depth + 1)?));
            }
        }

        let threshold = src.read_var_uint()?;
        src.finish()?;
        if threshold == 0 || threshold > members.len() as u64 {
            return Err(IdentityError::ValidationFailed(format!(
                "threshold {threshold} outside 1..={}",
                members.len()
            )));
        }
        Ok(Self {
            threshold: threshold as usize,
            members,
        })
    }

    /// Every leaf identity, depth first, duplicates included.
    pub fn identities(&self) -> Vec<&[u8]> {
        let mut out = Vec::new();
        self.collect_identities(&mut out);
        out
    }

    fn collect_identities<'g>(&'g self, out: &mut Vec<&'g [u8]>) {
        for member in &self.members {
            match member {
                Member::Identity(id) => out.push(id),
                Member::Group(g) => g.collect_identities(out),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Validation against storage
// ---------------------------------------------------------------------------

/// Check structure, then that every leaf identity is Active and holds at
/// least one live key.
pub fn validate(ctx: &NativeContext<'_>, group: &Group) -> IdentityResult<()> {
    group.check_structure()?;
    for member in group.identities() {
        let key = IdentityKey::new(member)?;
        match state::state(ctx, &key)? {
            IdentityState::Active => {}
            other => {
                return Err(IdentityError::ValidationFailed(format!(
                    "group member {} is {other}",
                    key.display()
                )))
            }
        }
        if !keys::has_live_key(ctx, &key)? {
            return Err(IdentityError::ValidationFailed(format!(
                "group member {} has no usable public key",
                key.display()
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Threshold verification
// ---------------------------------------------------------------------------

/// Shared-pool threshold check.
pub fn verify_threshold(group: &Group, signers: &HashSet<&[u8]>) -> bool {
    shared_satisfied(group, &|id: &[u8]| signers.contains(id))
}

fn shared_satisfied(group: &Group, has: &dyn Fn(&[u8]) -> bool) -> bool {
    group
        .members
        .iter()
        .filter(|member| match member {
            Member::Identity(id) => has(id),
            Member::Group(g) => shared_satisfied(g, has),
        })
        .count()
        >= group.threshold
}

/// Step limit for one partitioned check. A search that hits it fails
/// closed.
pub const MAX_PARTITION_STEPS: usize = 100_000;

/// Partitioned threshold check: succeeds iff some assignment of signers to
/// leaf slots, each signer used at most once, satisfies every level.
///
/// The search branches only on identities that occupy more than one leaf
/// slot, prunes any level whose reachable members fall short of its
/// threshold, and stops after [`MAX_PARTITION_STEPS`].
pub fn verify_threshold_partitioned(group: &Group, signers: &HashSet<&[u8]>) -> bool {
    let search = Partition::new(group);
    let mut pool: BTreeSet<&[u8]> = signers.iter().copied().collect();
    let ok = search.satisfy(group, &mut pool, &mut |_| true);
    if !ok && search.exhausted() {
        tracing::warn!(
            steps = MAX_PARTITION_STEPS,
            signers = signers.len(),
            "partitioned threshold search exhausted"
        );
    }
    ok
}

type Continuation<'k, 'g> = dyn FnMut(&mut BTreeSet<&'g [u8]>) -> bool + 'k;

struct Partition<'g> {
    /// Identities listed in more than one leaf slot.
    contested: HashSet<&'g [u8]>,
    steps: Cell<usize>,
}

impl<'g> Partition<'g> {
    fn new(group: &'g Group) -> Self {
        let mut seen = HashSet::new();
        let mut contested = HashSet::new();
        for id in group.identities() {
            if !seen.insert(id) {
                contested.insert(id);
            }
        }
        Self {
            contested,
            steps: Cell::new(0),
        }
    }

    fn exhausted(&self) -> bool {
        self.steps.get() >= MAX_PARTITION_STEPS
    }

    fn satisfy(
        &self,
        group: &'g Group,
        pool: &mut BTreeSet<&'g [u8]>,
        k: &mut Continuation<'_, 'g>,
    ) -> bool {
        self.satisfy_members(&group.members, group.threshold, pool, k)
    }

    /// Choose `need` of `members` to satisfy, drawing leaves from `pool`,
    /// then hand the remaining pool to `k`.
    fn satisfy_members(
        &self,
        members: &'g [Member],
        need: usize,
        pool: &mut BTreeSet<&'g [u8]>,
        k: &mut Continuation<'_, 'g>,
    ) -> bool {
        if need == 0 {
            return k(pool);
        }
        if self.exhausted() {
            return false;
        }
        self.steps.set(self.steps.get() + 1);
        if reachable(members, pool) < need {
            return false;
        }
        let Some((first, rest)) = members.split_first() else {
            return false;
        };

        match first {
            Member::Identity(id) => {
                let id = id.as_slice();
                if !pool.remove(id) {
                    return self.satisfy_members(rest, need, pool, k);
                }
                let taken = self.satisfy_members(rest, need - 1, pool, k);
                pool.insert(id);
                // Leaving a single-slot identity unused never helps.
                taken || (self.contested.contains(id) && self.satisfy_members(rest, need, pool, k))
            }
            Member::Group(sub) => {
                let taken = self.satisfy(sub, pool, &mut |p| {
                    self.satisfy_members(rest, need - 1, p, k)
                });
                taken || self.satisfy_members(rest, need, pool, k)
            }
        }
    }
}

/// Upper bound on how many of `members` the pool can satisfy at once:
/// distinct identities present plus subgroups met under the shared rule.
fn reachable(members: &[Member], pool: &BTreeSet<&[u8]>) -> usize {
    let mut identities = HashSet::new();
    let mut groups = 0;
    for member in members {
        match member {
            Member::Identity(id) if pool.contains(id.as_slice()) => {
                identities.insert(id.as_slice());
            }
            Member::Identity(_) => {}
            Member::Group(g) => {
                if shared_satisfied(g, &|id: &[u8]| pool.contains(id)) {
                    groups += 1;
                }
            }
        }
    }
    identities.len() + groups
}

impl SignerPolicy {
    pub fn verify_threshold(self, group: &Group, signers: &[Signer]) -> bool {
        let ids: HashSet<&[u8]> = signers.iter().map(|s| s.id.as_slice()).collect();
        match self {
            SignerPolicy::Shared => verify_threshold(group, &ids),
            SignerPolicy::Partitioned => verify_threshold_partitioned(group, &ids),
        }
    }
}

// ---------------------------------------------------------------------------
// Signatures
// ---------------------------------------------------------------------------

impl Signer {
    pub fn new(id: impl Into<Vec<u8>>, index: u32) -> Self {
        Self {
            id: id.into(),
            index,
        }
    }

    /// `varuint(n) ‖ n × (varbytes(id) ‖ varuint(index))`
    pub fn encode_list(signers: &[Signer]) -> Vec<u8> {
        let mut sink = Sink::new();
        sink.write_var_uint(signers.len() as u64);
        for s in signers {
            sink.write_var_bytes(&s.id).write_var_uint(u64::from(s.index));
        }
        sink.into_bytes()
    }

    pub fn decode_list(bytes: &[u8]) -> IdentityResult<Vec<Signer>> {
        let mut src = Source::new(bytes);
        let count = src.read_var_uint()?;
        if count > (src.remaining() / 2) as u64 {
            return Err(IdentityError::ValidationFailed(format!(
                "signer count {count} exceeds input"
            )));
        }
        let signers = (0..count)
            .map(|_| {
                let id = src.read_var_bytes()?.to_vec();
                let index = to_index(src.read_var_uint()?)?;
                Ok(Signer { id, index })
            })
            .collect::<IdentityResult<Vec<_>>>()?;
        src.finish()?;
        Ok(signers)
    }
}

/// Every signer must hold a live, mutation-capable key at the index it
/// named, and the witness oracle must confirm it.
pub fn verify_signatures(ctx: &NativeContext<'_>, signers: &[Signer]) -> IdentityResult<()> {
    for signer in signers {
        let key = IdentityKey::new(&signer.id)
            .map_err(|e| IdentityError::AuthorizationFailed(format!("bad signer: {e}")))?;
        state::require_active(ctx, &key).map_err(|e| {
            IdentityError::AuthorizationFailed(format!("signer {}: {e}", key.display()))
        })?;
        keys::check_witness_by_index(ctx, &key, signer.index, KeyUsage::Mutation)?;
    }
    Ok(())
}

/// Threshold plus signatures.
pub fn authorize(
    ctx: &NativeContext<'_>,
    group: &Group,
    signers: &[Signer],
    policy: SignerPolicy,
) -> IdentityResult<()> {
    if !policy.verify_threshold(group, signers) {
        tracing::warn!(signers = signers.len(), ?policy, "group threshold not met");
        return Err(IdentityError::AuthorizationFailed(
            "group threshold not met".into(),
        ));
    }
    verify_signatures(ctx, signers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{add_key, revoke_key, KeyAccess};
    use crate::state::set_state;
    use crate::test_util::Harness;
    use sovid_protocol::crypto::Keypair;
    use std::time::{Duration, Instant};

    fn id(name: &str) -> Vec<u8> {
        format!("did:sov:{name}").into_bytes()
    }

    fn leaf(name: &str) -> Member {
        Member::identity(id(name))
    }

    fn set(names: &[&str]) -> Vec<Vec<u8>> {
        names.iter().map(|n| id(n)).collect()
    }

    fn shared(g: &Group, names: &[&str]) -> bool {
        let ids = set(names);
        verify_threshold(g, &ids.iter().map(Vec::as_slice).collect())
    }

    fn partitioned(g: &Group, names: &[&str]) -> bool {
        let ids = set(names);
        verify_threshold_partitioned(g, &ids.iter().map(Vec::as_slice).collect())
    }

    /// `{1, [D, {1, [E, F]}]}`
    fn controller_group() -> Group {
        Group::new(
            1,
            vec![
                leaf("D"),
                Member::group(Group::new(1, vec![leaf("E"), leaf("F")])),
            ],
        )
    }

    #[test]
    fn decodes_reference_encoding() {
        let data = hex::decode(concat!(
            "01022a6469643a6f6e743a41525932656b6f6631654353657463696d47646a71",
            "797a5559615644445056576d775a01022a6469643a6f6e743a41536278745371",
            "72706d7964706a7143554744695170326d7a736664347a464172732a6469643a",
            "6f6e743a414778633363646542365146766d5a587a576847777a75766f684e74",
            "7161616144770102",
            "0101"
        ))
        .unwrap();
        let expected = Group::new(
            1,
            vec![
                Member::identity(&b"did:ont:ARY2ekof1eCSetcimGdjqyzUYaVDDPVWmw"[..]),
                Member::group(Group::new(
                    2,
                    vec![
                        Member::identity(&b"did:ont:ASbxtSqrpmydpjqCUGDiQp2mzsfd4zFArs"[..]),
                        Member::identity(&b"did:ont:AGxc3cdeB6QFvmZXzWhGwzuvohNtqaaaDw"[..]),
                    ],
                )),
            ],
        );
        assert_eq!(Group::from_bytes(&data).unwrap(), expected);
        assert_eq!(expected.to_bytes(), data);
    }

    #[test]
    fn rejects_malformed_reference_encodings() {
        // Two members, threshold 3.
        let over = hex::decode(concat!(
            "01022a6469643a6f6e743a4153627874537172706d7964706a7143554744695170",
            "326d7a736664347a464172732a6469643a6f6e743a41477863336364654236514676",
            "6d5a587a576847777a75766f684e747161616144770103"
        ))
        .unwrap();
        assert!(Group::from_bytes(&over).is_err());

        // "did" is neither an identity nor a group.
        let junk = hex::decode("010203646964086469643a6f6e740101").unwrap();
        assert!(Group::from_bytes(&junk).is_err());
    }

    #[test]
    fn decodes_reference_signer_list() {
        let id1 = b"did:ont:ASbxtSqrpmydpjqCUGDiQp2mzsfd4zFArs".to_vec();
        let id2 = b"did:ont:AGxc3cdeB6QFvmZXzWhGwzuvohNtqaaaDw".to_vec();
        let g = Group::new(
            1,
            vec![
                Member::identity(&b"did:ont:ARY2ekof1eCSetcimGdjqyzUYaVDDPVWmw"[..]),
                Member::group(Group::new(
                    2,
                    vec![Member::identity(id1.clone()), Member::identity(id2.clone())],
                )),
            ],
        );

        let both = hex::decode(concat!(
            "01022a6469643a6f6e743a4153627874537172706d7964706a7143554744695170",
            "326d7a736664347a4641727301012a6469643a6f6e743a4147786333636465423651",
            "46766d5a587a576847777a75766f684e747161616144770101"
        ))
        .unwrap();
        let signers = Signer::decode_list(&both).unwrap();
        assert_eq!(signers, vec![Signer::new(id1.clone(), 1), Signer::new(id2, 1)]);
        assert!(SignerPolicy::Shared.verify_threshold(&g, &signers));

        let one = hex::decode(concat!(
            "01012a6469643a6f6e743a4153627874537172706d7964706a7143554744695170",
            "326d7a736664347a464172730101"
        ))
        .unwrap();
        let signers = Signer::decode_list(&one).unwrap();
        assert_eq!(signers, vec![Signer::new(id1, 1)]);
        assert!(!SignerPolicy::Shared.verify_threshold(&g, &signers));
    }

    #[test]
    fn roundtrip_at_every_depth_up_to_limit() {
        let mut g = Group::new(1, vec![leaf("bottom")]);
        for level in 2..=MAX_GROUP_DEPTH {
            g = Group::new(
                2,
                vec![leaf(&format!("L{level}")), Member::group(g)],
            );
            assert_eq!(g.depth(), level);
            assert_eq!(Group::from_bytes(&g.to_bytes()).unwrap(), g);
        }
    }

    #[test]
    fn too_deep_rejected() {
        let mut g = Group::new(1, vec![leaf("bottom")]);
        for _ in 0..MAX_GROUP_DEPTH {
            g = Group::new(1, vec![Member::group(g)]);
        }
        assert_eq!(g.depth(), MAX_GROUP_DEPTH + 1);
        assert!(Group::from_bytes(&g.to_bytes()).is_err());
        assert!(g.check_structure().is_err());
    }

    #[test]
    fn threshold_bounds_enforced() {
        let over = Group::new(3, vec![leaf("A"), leaf("B")]);
        let zero = Group::new(0, vec![leaf("A")]);
        let empty = Group::new(1, vec![]);
        for g in [&over, &zero, &empty] {
            assert!(g.check_structure().is_err());
            assert!(Group::from_bytes(&g.to_bytes()).is_err());
        }
        let nested_bad = Group::new(1, vec![leaf("A"), Member::group(over.clone())]);
        assert!(nested_bad.check_structure().is_err());
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = controller_group().to_bytes();
        bytes.push(0);
        assert!(Group::from_bytes(&bytes).is_err());
    }

    #[test]
    fn shared_policy_counts_levels() {
        let g = controller_group();
        assert!(shared(&g, &["E"]));
        assert!(shared(&g, &["D"]));
        assert!(!shared(&g, &[]));
        assert!(!shared(&g, &["X"]));

        let two_of = Group::new(
            2,
            vec![leaf("A"), Member::group(Group::new(2, vec![leaf("B"), leaf("C")]))],
        );
        assert!(!shared(&two_of, &["A", "B"]));
        assert!(shared(&two_of, &["A", "B", "C"]));
    }

    #[test]
    fn shared_pool_reuses_signer_across_levels() {
        // A appears both at the top and inside the subgroup.
        let g = Group::new(
            2,
            vec![leaf("A"), Member::group(Group::new(1, vec![leaf("A"), leaf("B")]))],
        );
        assert!(shared(&g, &["A"]));
        assert!(!partitioned(&g, &["A"]));
        assert!(partitioned(&g, &["A", "B"]));
    }

    #[test]
    fn partitioned_policy_backtracks() {
        // A greedy assignment of A to the first subgroup would starve the
        // second one; the search must try A in the second.
        let g = Group::new(
            2,
            vec![
                Member::group(Group::new(1, vec![leaf("A"), leaf("B")])),
                Member::group(Group::new(1, vec![leaf("A")])),
            ],
        );
        assert!(partitioned(&g, &["A", "B"]));
        assert!(!partitioned(&g, &["A"]));
        assert!(shared(&g, &["A"]));
    }

    #[test]
    fn partitioned_check_stays_fast_on_wide_groups() {
        let names: Vec<String> = (0..60).map(|i| format!("m{i}")).collect();
        let present: Vec<&str> = names[..30].iter().map(String::as_str).collect();
        let start = Instant::now();

        // 60 single-slot leaves, 30 present.
        let members: Vec<Member> = names.iter().map(|n| leaf(n)).collect();
        assert!(!partitioned(&Group::new(31, members.clone()), &present));
        assert!(partitioned(&Group::new(30, members), &present));

        // Every present identity listed twice.
        let doubled: Vec<Member> = names[..30].iter().flat_map(|n| [leaf(n), leaf(n)]).collect();
        assert!(!partitioned(&Group::new(31, doubled.clone()), &present));
        assert!(shared(&Group::new(31, doubled), &present));

        // Overlapping pairs {1, [m_i, m_i+1]}; one signer per pair.
        let pairs: Vec<Member> = (0..29)
            .map(|i| Member::group(Group::new(1, vec![leaf(&names[i]), leaf(&names[i + 1])])))
            .collect();
        assert!(partitioned(&Group::new(29, pairs.clone()), &present));
        let without_m15: Vec<&str> = present.iter().copied().filter(|n| *n != "m15").collect();
        assert!(partitioned(&Group::new(29, pairs.clone()), &without_m15));
        let without_two: Vec<&str> = without_m15.iter().copied().filter(|n| *n != "m3").collect();
        assert!(!partitioned(&Group::new(29, pairs), &without_two));

        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn policies_agree_without_repeated_members() {
        let g = Group::new(
            2,
            vec![
                leaf("A"),
                Member::group(Group::new(2, vec![leaf("B"), leaf("C"), leaf("D")])),
                Member::group(Group::new(1, vec![leaf("E"), leaf("F")])),
            ],
        );
        let names = ["A", "B", "C", "D", "E", "F"];
        for mask in 0u32..(1 << names.len()) {
            let chosen: Vec<&str> = names
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, n)| *n)
                .collect();
            assert_eq!(
                shared(&g, &chosen),
                partitioned(&g, &chosen),
                "disagreement for {chosen:?}"
            );
        }
    }

    #[test]
    fn shared_matches_level_by_level_definition() {
        // Brute-force the definition for every subset of signers.
        fn reference(g: &Group, s: &HashSet<&str>) -> bool {
            let count = g
                .members
                .iter()
                .filter(|m| match m {
                    Member::Identity(id) => {
                        s.contains(std::str::from_utf8(&id[8..]).unwrap())
                    }
                    Member::Group(sub) => reference(sub, s),
                })
                .count();
            count >= g.threshold
        }
        let g = Group::new(
            2,
            vec![
                leaf("A"),
                Member::group(Group::new(
                    2,
                    vec![leaf("B"), Member::group(Group::new(1, vec![leaf("A"), leaf("C")]))],
                )),
                leaf("C"),
            ],
        );
        let names = ["A", "B", "C"];
        for mask in 0u32..8 {
            let chosen: Vec<&str> = names
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, n)| *n)
                .collect();
            let s: HashSet<&str> = chosen.iter().copied().collect();
            assert_eq!(shared(&g, &chosen), reference(&g, &s), "{chosen:?}");
        }
    }

    #[test]
    fn signer_list_roundtrip_and_limits() {
        let signers = vec![Signer::new(id("B"), 1), Signer::new(id("C"), 300)];
        let bytes = Signer::encode_list(&signers);
        assert_eq!(Signer::decode_list(&bytes).unwrap(), signers);

        let mut sink = Sink::new();
        sink.write_var_uint(1).write_var_bytes(&id("B")).write_var_uint(1 << 40);
        assert!(Signer::decode_list(&sink.into_bytes()).is_err());

        let mut sink = Sink::new();
        sink.write_var_uint(500);
        assert!(Signer::decode_list(&sink.into_bytes()).is_err());
    }

    #[test]
    fn json_renders_nested_members() {
        let json = serde_json::to_value(controller_group()).unwrap();
        assert_eq!(json["threshold"], 1);
        assert_eq!(json["members"][0], "did:sov:D");
        assert_eq!(json["members"][1]["members"][1], "did:sov:F");
    }

    // -- Storage-backed checks ---------------------------------------------

    fn register(ctx: &mut NativeContext<'_>, name: &str, key: &[u8]) {
        let k = IdentityKey::new(&id(name)).unwrap();
        set_state(ctx, &k, IdentityState::Active).unwrap();
        add_key(ctx, &k, key, KeyAccess::All).unwrap();
    }

    #[test]
    fn validate_requires_active_members_with_keys() {
        let mut h = Harness::new();
        let mut ctx = h.ctx();
        register(&mut ctx, "D", b"kd");
        register(&mut ctx, "E", b"ke");

        // F unregistered.
        assert!(matches!(
            validate(&ctx, &controller_group()),
            Err(IdentityError::ValidationFailed(msg)) if msg.contains("did:sov:F")
        ));

        register(&mut ctx, "F", b"kf");
        validate(&ctx, &controller_group()).unwrap();

        // F loses its only key.
        revoke_key(&mut ctx, &IdentityKey::new(&id("F")).unwrap(), 1).unwrap();
        assert!(validate(&ctx, &controller_group()).is_err());
    }

    #[test]
    fn authorize_checks_threshold_then_witnesses() {
        let e = Keypair::generate();
        let mut h = Harness::new();
        {
            let mut ctx = h.ctx();
            register(&mut ctx, "D", b"kd");
            register(&mut ctx, "E", &e.public_key_bytes());
            register(&mut ctx, "F", b"kf");
        }
        let g = controller_group();
        let signers = vec![Signer::new(id("E"), 1)];

        // Threshold met, but E did not sign.
        assert!(matches!(
            authorize(&h.ctx(), &g, &signers, SignerPolicy::Shared),
            Err(IdentityError::AuthorizationFailed(_))
        ));

        h.sign_with(&[&e]);
        authorize(&h.ctx(), &g, &signers, SignerPolicy::Shared).unwrap();

        // Wrong index.
        assert!(authorize(&h.ctx(), &g, &[Signer::new(id("E"), 2)], SignerPolicy::Shared).is_err());

        // An unsigned extra signer spoils the whole set.
        let with_bad = vec![Signer::new(id("E"), 1), Signer::new(id("D"), 1)];
        assert!(matches!(
            authorize(&h.ctx(), &g, &with_bad, SignerPolicy::Shared),
            Err(IdentityError::AuthorizationFailed(_))
        ));

        // Threshold not met.
        assert!(authorize(&h.ctx(), &g, &[], SignerPolicy::Shared).is_err());
    }
}
