//! Recovery groups.
//!
//! A recovery group is set once by the identity's own key. After that only
//! the group itself can replace it, and it can add or revoke the identity's
//! keys without any owner key.

use sovid_protocol::config::FIELD_RECOVERY;
use sovid_protocol::host::NativeContext;

use crate::error::{IdentityError, IdentityResult, StorageContext};
use crate::group::{self, Group, Signer, SignerPolicy};
use crate::state::IdentityKey;

/// The recovery group of `id`, if any.
pub fn get(ctx: &NativeContext<'_>, id: &IdentityKey) -> IdentityResult<Option<Group>> {
    ctx.get(&id.field(FIELD_RECOVERY))
        .during("read recovery")?
        .map(|raw| Group::from_bytes(&raw))
        .transpose()
}

/// Validate and store `group` as the recovery group, replacing any
/// existing one. Callers check authorization first.
pub fn put(ctx: &mut NativeContext<'_>, id: &IdentityKey, group: &Group) -> IdentityResult<()> {
    group::validate(ctx, group)?;
    ctx.put(&id.field(FIELD_RECOVERY), &group.to_bytes())
        .during("write recovery")
}

/// Fail with `DuplicateEntry` when a recovery group is already set.
pub fn require_unset(ctx: &NativeContext<'_>, id: &IdentityKey) -> IdentityResult<()> {
    if get(ctx, id)?.is_some() {
        return Err(IdentityError::DuplicateEntry(format!(
            "{} already has a recovery group",
            id.display()
        )));
    }
    Ok(())
}

/// Authorize the current call through `id`'s recovery group.
pub fn verify(
    ctx: &NativeContext<'_>,
    id: &IdentityKey,
    signers: &[Signer],
    policy: SignerPolicy,
) -> IdentityResult<Group> {
    let Some(group) = get(ctx, id)? else {
        tracing::warn!(did = %id.display(), "no recovery group to authorize call");
        return Err(IdentityError::AuthorizationFailed(format!(
            "{} has no recovery group",
            id.display()
        )));
    };
    group::authorize(ctx, &group, signers, policy)?;
    Ok(group)
}

pub(crate) fn clear(ctx: &mut NativeContext<'_>, id: &IdentityKey) -> IdentityResult<()> {
    ctx.delete(&id.field(FIELD_RECOVERY))
        .during("delete recovery")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::Member;
    use crate::keys::{add_key, KeyAccess};
    use crate::state::{set_state, IdentityState};
    use crate::test_util::Harness;
    use sovid_protocol::crypto::Keypair;

    fn active(ctx: &mut NativeContext<'_>, name: &[u8], key: &[u8]) -> IdentityKey {
        let id = IdentityKey::new(name).unwrap();
        set_state(ctx, &id, IdentityState::Active).unwrap();
        add_key(ctx, &id, key, KeyAccess::All).unwrap();
        id
    }

    #[test]
    fn put_get_and_verify() {
        let b = Keypair::generate();
        let c = Keypair::generate();
        let mut h = Harness::new();
        let g = Group::new(
            2,
            vec![Member::identity(&b"did:sov:B"[..]), Member::identity(&b"did:sov:C"[..])],
        );
        {
            let mut ctx = h.ctx();
            let a = active(&mut ctx, b"did:sov:A", b"ka");
            active(&mut ctx, b"did:sov:B", &b.public_key_bytes());
            active(&mut ctx, b"did:sov:C", &c.public_key_bytes());
            require_unset(&ctx, &a).unwrap();
            put(&mut ctx, &a, &g).unwrap();
            assert!(matches!(
                require_unset(&ctx, &a),
                Err(IdentityError::DuplicateEntry(_))
            ));
            assert_eq!(get(&ctx, &a).unwrap(), Some(g.clone()));
        }

        let a = IdentityKey::new(b"did:sov:A").unwrap();
        let signers = vec![Signer::new(&b"did:sov:B"[..], 1), Signer::new(&b"did:sov:C"[..], 1)];
        h.sign_with(&[&b]);
        assert!(verify(&h.ctx(), &a, &signers[..1], SignerPolicy::Shared).is_err());
        assert!(verify(&h.ctx(), &a, &signers, SignerPolicy::Shared).is_err());
        h.sign_with(&[&b, &c]);
        assert_eq!(verify(&h.ctx(), &a, &signers, SignerPolicy::Shared).unwrap(), g);
    }

    #[test]
    fn invalid_group_not_stored() {
        let mut h = Harness::new();
        let mut ctx = h.ctx();
        let a = active(&mut ctx, b"did:sov:A", b"ka");
        let g = Group::new(1, vec![Member::identity(&b"did:sov:nobody"[..])]);
        assert!(matches!(
            put(&mut ctx, &a, &g),
            Err(IdentityError::ValidationFailed(_))
        ));
        assert_eq!(get(&ctx, &a).unwrap(), None);
    }

    #[test]
    fn verify_without_group_fails() {
        let mut h = Harness::new();
        let mut ctx = h.ctx();
        let a = active(&mut ctx, b"did:sov:A", b"ka");
        assert!(matches!(
            verify(&ctx, &a, &[], SignerPolicy::Shared),
            Err(IdentityError::AuthorizationFailed(_))
        ));
    }
}
