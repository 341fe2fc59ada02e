//! # Controller Link
//!
//! An identity may delegate authority to one controller: either another
//! identity, which authorizes calls with one of its own keys, or a
//! threshold group, which authorizes with a signer list.
//!
//! The record under the controller field holds the raw DID when the
//! controller is a single identity, and the serialized group otherwise.

use serde::Serialize;

use sovid_protocol::codec::Source;
use sovid_protocol::config::FIELD_CONTROLLER;
use sovid_protocol::host::NativeContext;

use crate::error::{display_id, IdentityError, IdentityResult, StorageContext};
use crate::group::{self, Group, Signer, SignerPolicy};
use crate::keys::{self, to_index, KeyUsage};
use crate::state::{self, IdentityKey};

const IDENTITY_PREFIX: &[u8] = b"did:";

/// Who controls an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Controller {
    Single(#[serde(serialize_with = "crate::document::as_utf8")] Vec<u8>),
    Group(Group),
}

/// The proof a controller presents for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerAuth {
    /// Key index of the single controller identity.
    Index(u32),
    /// Signers of the controller group.
    Signers(Vec<Signer>),
}

impl Controller {
    /// Parse a controller reference: a DID selects a single controller,
    /// anything else must be a serialized group.
    pub fn from_bytes(raw: &[u8]) -> IdentityResult<Self> {
        if raw.starts_with(IDENTITY_PREFIX) {
            IdentityKey::new(raw)?;
            Ok(Controller::Single(raw.to_vec()))
        } else {
            Ok(Controller::Group(Group::from_bytes(raw)?))
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Controller::Single(id) => id.clone(),
            Controller::Group(g) => g.to_bytes(),
        }
    }

    /// Read the auth proof matching this controller's kind from a request.
    pub fn decode_auth(&self, src: &mut Source<'_>) -> IdentityResult<ControllerAuth> {
        match self {
            Controller::Single(_) => Ok(ControllerAuth::Index(to_index(src.read_var_uint()?)?)),
            Controller::Group(_) => Ok(ControllerAuth::Signers(Signer::decode_list(
                src.read_var_bytes()?,
            )?)),
        }
    }

    /// Setup checks: a single controller must be Active with a usable key;
    /// a group must pass [`group::validate`].
    pub fn validate(&self, ctx: &NativeContext<'_>) -> IdentityResult<()> {
        match self {
            Controller::Single(id) => {
                let key = IdentityKey::new(id)?;
                state::require_active(ctx, &key).map_err(|e| {
                    IdentityError::ValidationFailed(format!("controller {}: {e}", key.display()))
                })?;
                if !keys::has_live_key(ctx, &key)? {
                    return Err(IdentityError::ValidationFailed(format!(
                        "controller {} has no usable public key",
                        key.display()
                    )));
                }
                Ok(())
            }
            Controller::Group(g) => group::validate(ctx, g),
        }
    }

    /// Check that `auth` carries this controller's authority for the
    /// current call.
    pub fn authorize(
        &self,
        ctx: &NativeContext<'_>,
        auth: &ControllerAuth,
        policy: SignerPolicy,
    ) -> IdentityResult<()> {
        match (self, auth) {
            (Controller::Single(id), ControllerAuth::Index(index)) => {
                let key = IdentityKey::new(id)?;
                state::require_active(ctx, &key).map_err(|e| {
                    IdentityError::AuthorizationFailed(format!("controller {}: {e}", key.display()))
                })?;
                keys::check_witness_by_index(ctx, &key, *index, KeyUsage::Mutation)
            }
            (Controller::Group(g), ControllerAuth::Signers(signers)) => {
                group::authorize(ctx, g, signers, policy)
            }
            (Controller::Single(id), ControllerAuth::Signers(_)) => {
                Err(IdentityError::AuthorizationFailed(format!(
                    "controller {} expects a key index, not a signer list",
                    display_id(id)
                )))
            }
            (Controller::Group(_), ControllerAuth::Index(_)) => Err(
                IdentityError::AuthorizationFailed("group controller expects a signer list".into()),
            ),
        }
    }
}

/// The controller of `id`, if any.
pub fn get(ctx: &NativeContext<'_>, id: &IdentityKey) -> IdentityResult<Option<Controller>> {
    ctx.get(&id.field(FIELD_CONTROLLER))
        .during("read controller")?
        .map(|raw| Controller::from_bytes(&raw))
        .transpose()
}

/// Attach a controller. Fails with `DuplicateEntry` if one is already set.
pub fn set(
    ctx: &mut NativeContext<'_>,
    id: &IdentityKey,
    controller: &Controller,
) -> IdentityResult<()> {
    if get(ctx, id)?.is_some() {
        return Err(IdentityError::DuplicateEntry(format!(
            "{} already has a controller",
            id.display()
        )));
    }
    controller.validate(ctx)?;
    ctx.put(&id.field(FIELD_CONTROLLER), &controller.to_bytes())
        .during("write controller")
}

/// Detach the controller. Returns whether one was set.
pub fn remove(ctx: &mut NativeContext<'_>, id: &IdentityKey) -> IdentityResult<bool> {
    let existed = get(ctx, id)?.is_some();
    ctx.delete(&id.field(FIELD_CONTROLLER))
        .during("delete controller")?;
    Ok(existed)
}

/// Authorize the current call through `id`'s controller.
pub fn verify(
    ctx: &NativeContext<'_>,
    id: &IdentityKey,
    auth: &ControllerAuth,
    policy: SignerPolicy,
) -> IdentityResult<()> {
    let Some(controller) = get(ctx, id)? else {
        tracing::warn!(did = %id.display(), "no controller to authorize call");
        return Err(IdentityError::AuthorizationFailed(format!(
            "{} has no controller",
            id.display()
        )));
    };
    controller.authorize(ctx, auth, policy)
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
    fn single_controller_roundtrip() {
        let ctl = Keypair::generate();
        let mut h = Harness::new();
        {
            let mut ctx = h.ctx();
            let a = active(&mut ctx, b"did:sov:A", b"ka");
            active(&mut ctx, b"did:sov:C", &ctl.public_key_bytes());
            let c = Controller::Single(b"did:sov:C".to_vec());
            set(&mut ctx, &a, &c).unwrap();
            assert_eq!(get(&ctx, &a).unwrap(), Some(c.clone()));
            assert!(matches!(
                set(&mut ctx, &a, &c),
                Err(IdentityError::DuplicateEntry(_))
            ));
        }

        let a = IdentityKey::new(b"did:sov:A").unwrap();
        assert!(verify(&h.ctx(), &a, &ControllerAuth::Index(1), SignerPolicy::Shared).is_err());
        h.sign_with(&[&ctl]);
        verify(&h.ctx(), &a, &ControllerAuth::Index(1), SignerPolicy::Shared).unwrap();
        assert!(verify(
            &h.ctx(),
            &a,
            &ControllerAuth::Signers(vec![]),
            SignerPolicy::Shared
        )
        .is_err());

        let mut ctx = h.ctx();
        assert!(remove(&mut ctx, &a).unwrap());
        assert!(!remove(&mut ctx, &a).unwrap());
        assert!(matches!(
            verify(&ctx, &a, &ControllerAuth::Index(1), SignerPolicy::Shared),
            Err(IdentityError::AuthorizationFailed(_))
        ));
    }

    #[test]
    fn unregistered_single_controller_rejected() {
        let mut h = Harness::new();
        let mut ctx = h.ctx();
        let a = active(&mut ctx, b"did:sov:A", b"ka");
        let c = Controller::Single(b"did:sov:ghost".to_vec());
        assert!(matches!(
            set(&mut ctx, &a, &c),
            Err(IdentityError::ValidationFailed(_))
        ));
        assert_eq!(get(&ctx, &a).unwrap(), None);
    }

    #[test]
    fn group_controller_stored_serialized() {
        let mut h = Harness::new();
        let mut ctx = h.ctx();
        let a = active(&mut ctx, b"did:sov:A", b"ka");
        active(&mut ctx, b"did:sov:B", b"kb");
        active(&mut ctx, b"did:sov:C", b"kc");
        let g = Group::new(
            2,
            vec![Member::identity(&b"did:sov:B"[..]), Member::identity(&b"did:sov:C"[..])],
        );
        set(&mut ctx, &a, &Controller::Group(g.clone())).unwrap();
        let raw = ctx.get(&a.field(FIELD_CONTROLLER)).unwrap().unwrap();
        assert_eq!(raw, g.to_bytes());
        assert_eq!(get(&ctx, &a).unwrap(), Some(Controller::Group(g)));
    }

    #[test]
    fn auth_decoding_follows_controller_kind() {
        use sovid_protocol::codec::Sink;

        let single = Controller::Single(b"did:sov:C".to_vec());
        let mut sink = Sink::new();
        sink.write_var_uint(3);
        let bytes = sink.into_bytes();
        assert_eq!(
            single.decode_auth(&mut Source::new(&bytes)).unwrap(),
            ControllerAuth::Index(3)
        );

        let grp = Controller::Group(Group::new(1, vec![Member::identity(&b"did:sov:B"[..])]));
        let signers = vec![Signer::new(&b"did:sov:B"[..], 1)];
        let mut sink = Sink::new();
        sink.write_var_bytes(&Signer::encode_list(&signers));
        let bytes = sink.into_bytes();
        assert_eq!(
            grp.decode_auth(&mut Source::new(&bytes)).unwrap(),
            ControllerAuth::Signers(signers)
        );
    }
}
