//! # Identity Registry
//!
//! The orchestrator. Every public operation follows the same shape:
//!
//! 1. resolve the target identity and check its lifecycle state,
//! 2. authorize through one of three paths,
//! 3. apply the key/attribute/controller/recovery primitive,
//! 4. emit an event.
//!
//! ## Authorization paths
//!
//! | Path        | Proof                                   | Used by                    |
//! |-------------|-----------------------------------------|----------------------------|
//! | Owner       | index of one of the identity's own keys | `add_key`, `set_recovery`… |
//! | Controller  | controller key index or signer list     | `*_by_controller`, revoke  |
//! | Recovery    | signer list of the recovery group       | `*_by_recovery`            |
//!
//! Owner and single-controller keys must carry mutation access; an
//! authentication-only key can only answer [`IdentityRegistry::verify_signature`].
//!
//! Writes go straight to the context's store. Callers run each operation
//! against a per-call overlay and drop it on `Err`.

use sovid_protocol::config::DID_METHOD;
use sovid_protocol::crypto::Address;
use sovid_protocol::host::{Event, NativeContext};
use sovid_protocol::identity::Did;

use crate::attributes::{self, Attribute};
use crate::contexts;
use crate::controller::{self, Controller, ControllerAuth};
use crate::document::{Document, KeyState};
use crate::error::{IdentityError, IdentityResult};
use crate::group::{Group, Signer, SignerPolicy};
use crate::keys::{self, KeyAccess, KeyUsage, PublicKeyEntry};
use crate::recovery;
use crate::services::{self, Service};
use crate::state::{self, IdentityKey, IdentityState};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Runtime options of the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityConfig {
    /// DID method accepted at registration.
    pub did_method: String,
    /// How signers count across nested group levels.
    pub signer_policy: SignerPolicy,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            did_method: DID_METHOD.to_string(),
            signer_policy: SignerPolicy::Shared,
        }
    }
}

/// The identity contract.
#[derive(Debug, Clone, Default)]
pub struct IdentityRegistry {
    config: IdentityConfig,
}

impl IdentityRegistry {
    pub fn new(config: IdentityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IdentityConfig {
        &self.config
    }

    fn policy(&self) -> SignerPolicy {
        self.config.signer_policy
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Resolve a new identity: the DID must be well formed for the
    /// configured method and not yet registered.
    fn new_identity(&self, ctx: &NativeContext<'_>, id: &[u8]) -> IdentityResult<IdentityKey> {
        Did::parse_bytes(id, &self.config.did_method)?;
        let key = IdentityKey::new(id)?;
        match state::state(ctx, &key)? {
            IdentityState::Unregistered => Ok(key),
            IdentityState::Active | IdentityState::Revoked => {
                Err(IdentityError::AlreadyRegistered(key.display()))
            }
        }
    }

    /// Register `id` with `public_key` as key #1. The key must have signed
    /// the call.
    pub fn register(
        &self,
        ctx: &mut NativeContext<'_>,
        id: &[u8],
        public_key: &[u8],
    ) -> IdentityResult<()> {
        let key = self.new_identity(ctx, id)?;
        keys::validate_raw_key(public_key)?;
        if !ctx.check_witness(&Address::from_public_key(public_key)) {
            tracing::warn!(did = %key.display(), "registration key did not sign");
            return Err(IdentityError::AuthorizationFailed(
                "registration key did not sign the call".into(),
            ));
        }

        state::set_state(ctx, &key, IdentityState::Active)?;
        keys::add_key(ctx, &key, public_key, KeyAccess::All)?;
        ctx.notify(Event::new("Register", vec![key.hex()]));
        tracing::info!(did = %key.display(), "identity registered");
        Ok(())
    }

    /// Register and attach a batch of attributes in the same call.
    pub fn register_with_attributes(
        &self,
        ctx: &mut NativeContext<'_>,
        id: &[u8],
        public_key: &[u8],
        attributes: &[Attribute],
    ) -> IdentityResult<()> {
        for attribute in attributes {
            attribute.validate()?;
        }
        self.register(ctx, id, public_key)?;
        let key = IdentityKey::new(id)?;
        upsert_all(ctx, &key, attributes)
    }

    /// Register a keyless identity governed by `controller`, which must
    /// authorize the registration itself.
    pub fn register_with_controller(
        &self,
        ctx: &mut NativeContext<'_>,
        id: &[u8],
        controller: &Controller,
        auth: &ControllerAuth,
    ) -> IdentityResult<()> {
        let key = self.new_identity(ctx, id)?;
        controller.validate(ctx)?;
        controller.authorize(ctx, auth, self.policy())?;

        state::set_state(ctx, &key, IdentityState::Active)?;
        controller::set(ctx, &key, controller)?;
        ctx.notify(Event::new("Register", vec![key.hex()]));
        ctx.notify(controller_event(&key, "set", Some(controller)));
        tracing::info!(did = %key.display(), "identity registered under controller");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Owner path
    // -----------------------------------------------------------------------

    fn authorize_owner(
        &self,
        ctx: &NativeContext<'_>,
        id: &[u8],
        signer_index: u32,
    ) -> IdentityResult<IdentityKey> {
        let key = active(ctx, id)?;
        keys::check_witness_by_index(ctx, &key, signer_index, KeyUsage::Mutation)?;
        Ok(key)
    }

    /// Add a key with the given access level, signed by one of the
    /// identity's own keys.
    pub fn add_key(
        &self,
        ctx: &mut NativeContext<'_>,
        id: &[u8],
        public_key: &[u8],
        access: KeyAccess,
        signer_index: u32,
    ) -> IdentityResult<u32> {
        let key = self.authorize_owner(ctx, id, signer_index)?;
        add_key_and_notify(ctx, &key, public_key, access)
    }

    /// Revoke a key, signed by one of the identity's own keys.
    pub fn remove_key(
        &self,
        ctx: &mut NativeContext<'_>,
        id: &[u8],
        index: u32,
        signer_index: u32,
    ) -> IdentityResult<()> {
        let key = self.authorize_owner(ctx, id, signer_index)?;
        revoke_key_and_notify(ctx, &key, index)
    }

    pub fn add_attributes(
        &self,
        ctx: &mut NativeContext<'_>,
        id: &[u8],
        attributes: &[Attribute],
        signer_index: u32,
    ) -> IdentityResult<()> {
        let key = self.authorize_owner(ctx, id, signer_index)?;
        upsert_all(ctx, &key, attributes)
    }

    pub fn remove_attribute(
        &self,
        ctx: &mut NativeContext<'_>,
        id: &[u8],
        attribute_key: &[u8],
        signer_index: u32,
    ) -> IdentityResult<()> {
        let key = self.authorize_owner(ctx, id, signer_index)?;
        remove_attribute_and_notify(ctx, &key, attribute_key)
    }

    /// Change the access level of key `index`. The signing key must be a
    /// different one, so an owner cannot downgrade the key it signs with.
    pub fn set_key_access(
        &self,
        ctx: &mut NativeContext<'_>,
        id: &[u8],
        index: u32,
        access: KeyAccess,
        signer_index: u32,
    ) -> IdentityResult<()> {
        if index == signer_index {
            return Err(IdentityError::ValidationFailed(
                "a key cannot change its own access level".into(),
            ));
        }
        let key = self.authorize_owner(ctx, id, signer_index)?;
        keys::set_access(ctx, &key, index, access)?;
        ctx.notify(Event::new(
            "KeyAccessChanged",
            vec![key.hex(), index.to_string(), access.code().to_string()],
        ));
        Ok(())
    }

    /// Attach a controller, signed by one of the identity's own keys.
    pub fn set_controller(
        &self,
        ctx: &mut NativeContext<'_>,
        id: &[u8],
        controller: &Controller,
        signer_index: u32,
    ) -> IdentityResult<()> {
        let key = self.authorize_owner(ctx, id, signer_index)?;
        controller::set(ctx, &key, controller)?;
        ctx.notify(controller_event(&key, "set", Some(controller)));
        Ok(())
    }

    /// Set the recovery group. Only allowed while none is set.
    pub fn set_recovery(
        &self,
        ctx: &mut NativeContext<'_>,
        id: &[u8],
        group: &Group,
        signer_index: u32,
    ) -> IdentityResult<()> {
        let key = self.authorize_owner(ctx, id, signer_index)?;
        recovery::require_unset(ctx, &key)?;
        recovery::put(ctx, &key, group)?;
        ctx.notify(Event::new(
            "RecoverySet",
            vec![key.hex(), hex::encode(group.to_bytes())],
        ));
        tracing::info!(did = %key.display(), "recovery group set");
        Ok(())
    }

    pub fn add_service(
        &self,
        ctx: &mut NativeContext<'_>,
        id: &[u8],
        service: &Service,
        signer_index: u32,
    ) -> IdentityResult<()> {
        let key = self.authorize_owner(ctx, id, signer_index)?;
        services::add(ctx, &key, service)?;
        ctx.notify(service_event(&key, "ServiceAdded", &service.id));
        Ok(())
    }

    /// Replace an existing service's type and endpoint.
    pub fn update_service(
        &self,
        ctx: &mut NativeContext<'_>,
        id: &[u8],
        service: &Service,
        signer_index: u32,
    ) -> IdentityResult<()> {
        let key = self.authorize_owner(ctx, id, signer_index)?;
        services::update(ctx, &key, service)?;
        ctx.notify(service_event(&key, "ServiceUpdated", &service.id));
        Ok(())
    }

    pub fn remove_service(
        &self,
        ctx: &mut NativeContext<'_>,
        id: &[u8],
        service_id: &[u8],
        signer_index: u32,
    ) -> IdentityResult<()> {
        let key = self.authorize_owner(ctx, id, signer_index)?;
        services::remove(ctx, &key, service_id)?;
        ctx.notify(service_event(&key, "ServiceRemoved", service_id));
        Ok(())
    }

    /// Add JSON-LD contexts. Entries already present are skipped; the
    /// event lists only the ones added and is not emitted when none were.
    pub fn add_contexts(
        &self,
        ctx: &mut NativeContext<'_>,
        id: &[u8],
        batch: &[Vec<u8>],
        signer_index: u32,
    ) -> IdentityResult<()> {
        let key = self.authorize_owner(ctx, id, signer_index)?;
        let added = contexts::add(ctx, &key, batch)?;
        if let Some(event) = context_event(&key, "ContextAdded", &added) {
            ctx.notify(event);
        }
        Ok(())
    }

    pub fn remove_contexts(
        &self,
        ctx: &mut NativeContext<'_>,
        id: &[u8],
        batch: &[Vec<u8>],
        signer_index: u32,
    ) -> IdentityResult<()> {
        let key = self.authorize_owner(ctx, id, signer_index)?;
        let removed = contexts::remove(ctx, &key, batch)?;
        if let Some(event) = context_event(&key, "ContextRemoved", &removed) {
            ctx.notify(event);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Controller path
    // -----------------------------------------------------------------------

    fn authorize_controller(
        &self,
        ctx: &NativeContext<'_>,
        id: &[u8],
        auth: &ControllerAuth,
    ) -> IdentityResult<IdentityKey> {
        let key = active(ctx, id)?;
        controller::verify(ctx, &key, auth, self.policy())?;
        Ok(key)
    }

    pub fn remove_controller(
        &self,
        ctx: &mut NativeContext<'_>,
        id: &[u8],
        auth: &ControllerAuth,
    ) -> IdentityResult<()> {
        let key = self.authorize_controller(ctx, id, auth)?;
        controller::remove(ctx, &key)?;
        ctx.notify(controller_event(&key, "removed", None));
        Ok(())
    }

    pub fn add_key_by_controller(
        &self,
        ctx: &mut NativeContext<'_>,
        id: &[u8],
        public_key: &[u8],
        access: KeyAccess,
        auth: &ControllerAuth,
    ) -> IdentityResult<u32> {
        let key = self.authorize_controller(ctx, id, auth)?;
        add_key_and_notify(ctx, &key, public_key, access)
    }

    pub fn remove_key_by_controller(
        &self,
        ctx: &mut NativeContext<'_>,
        id: &[u8],
        index: u32,
        auth: &ControllerAuth,
    ) -> IdentityResult<()> {
        let key = self.authorize_controller(ctx, id, auth)?;
        revoke_key_and_notify(ctx, &key, index)
    }

    pub fn add_attributes_by_controller(
        &self,
        ctx: &mut NativeContext<'_>,
        id: &[u8],
        attributes: &[Attribute],
        auth: &ControllerAuth,
    ) -> IdentityResult<()> {
        let key = self.authorize_controller(ctx, id, auth)?;
        upsert_all(ctx, &key, attributes)
    }

    pub fn remove_attribute_by_controller(
        &self,
        ctx: &mut NativeContext<'_>,
        id: &[u8],
        attribute_key: &[u8],
        auth: &ControllerAuth,
    ) -> IdentityResult<()> {
        let key = self.authorize_controller(ctx, id, auth)?;
        remove_attribute_and_notify(ctx, &key, attribute_key)
    }

    /// Whether `auth` currently carries the controller's authority.
    pub fn verify_controller(
        &self,
        ctx: &NativeContext<'_>,
        id: &[u8],
        auth: &ControllerAuth,
    ) -> IdentityResult<bool> {
        rejected_as_false(self.authorize_controller(ctx, id, auth).map(|_| ()))
    }

    /// Revoke the identity. Needs controller authority. Every record the
    /// identity owns is dropped and it can never be used or registered
    /// again.
    pub fn revoke(
        &self,
        ctx: &mut NativeContext<'_>,
        id: &[u8],
        auth: &ControllerAuth,
    ) -> IdentityResult<()> {
        let key = self.authorize_controller(ctx, id, auth)?;
        keys::clear_keys(ctx, &key)?;
        let dropped = attributes::clear(ctx, &key)?;
        services::clear(ctx, &key)?;
        contexts::clear(ctx, &key)?;
        controller::remove(ctx, &key)?;
        recovery::clear(ctx, &key)?;
        state::set_state(ctx, &key, IdentityState::Revoked)?;
        ctx.notify(Event::new("Revoked", vec![key.hex()]));
        tracing::info!(did = %key.display(), attributes = dropped, "identity revoked");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Recovery path
    // -----------------------------------------------------------------------

    fn authorize_recovery(
        &self,
        ctx: &NativeContext<'_>,
        id: &[u8],
        signers: &[Signer],
    ) -> IdentityResult<IdentityKey> {
        let key = active(ctx, id)?;
        recovery::verify(ctx, &key, signers, self.policy())?;
        Ok(key)
    }

    /// Replace the recovery group, signed by the current one.
    pub fn update_recovery(
        &self,
        ctx: &mut NativeContext<'_>,
        id: &[u8],
        group: &Group,
        signers: &[Signer],
    ) -> IdentityResult<()> {
        let key = self.authorize_recovery(ctx, id, signers)?;
        recovery::put(ctx, &key, group)?;
        ctx.notify(Event::new(
            "RecoveryUpdated",
            vec![key.hex(), hex::encode(group.to_bytes())],
        ));
        tracing::info!(did = %key.display(), "recovery group replaced");
        Ok(())
    }

    pub fn add_key_by_recovery(
        &self,
        ctx: &mut NativeContext<'_>,
        id: &[u8],
        public_key: &[u8],
        access: KeyAccess,
        signers: &[Signer],
    ) -> IdentityResult<u32> {
        let key = self.authorize_recovery(ctx, id, signers)?;
        add_key_and_notify(ctx, &key, public_key, access)
    }

    pub fn remove_key_by_recovery(
        &self,
        ctx: &mut NativeContext<'_>,
        id: &[u8],
        index: u32,
        signers: &[Signer],
    ) -> IdentityResult<()> {
        let key = self.authorize_recovery(ctx, id, signers)?;
        revoke_key_and_notify(ctx, &key, index)
    }

    // -----------------------------------------------------------------------
    // Verification and queries
    // -----------------------------------------------------------------------

    /// Whether key `index` of `id` signed the call. Authentication-only
    /// keys qualify.
    pub fn verify_signature(
        &self,
        ctx: &NativeContext<'_>,
        id: &[u8],
        index: u32,
    ) -> IdentityResult<bool> {
        let key = active(ctx, id)?;
        rejected_as_false(keys::check_witness_by_index(
            ctx,
            &key,
            index,
            KeyUsage::Authentication,
        ))
    }

    /// All keys, revoked included, in index order.
    pub fn get_public_keys(
        &self,
        ctx: &NativeContext<'_>,
        id: &[u8],
    ) -> IdentityResult<Vec<PublicKeyEntry>> {
        keys::list_keys(ctx, &active(ctx, id)?)
    }

    /// All attributes, newest first.
    pub fn get_attributes(
        &self,
        ctx: &NativeContext<'_>,
        id: &[u8],
    ) -> IdentityResult<Vec<Attribute>> {
        let key = active(ctx, id)?;
        attributes::list(ctx, &key).collect()
    }

    /// A single attribute; `NotFound` if the key is absent.
    pub fn get_attribute_by_key(
        &self,
        ctx: &NativeContext<'_>,
        id: &[u8],
        attribute_key: &[u8],
    ) -> IdentityResult<Attribute> {
        let key = active(ctx, id)?;
        attributes::get(ctx, &key, attribute_key)?.ok_or_else(|| {
            IdentityError::NotFound(format!(
                "attribute {} of {}",
                hex::encode(attribute_key),
                key.display()
            ))
        })
    }

    /// The raw bytes of live key `index`. A revoked key is reported as
    /// `NotFound` like a missing one.
    pub fn get_public_key_by_id(
        &self,
        ctx: &NativeContext<'_>,
        id: &[u8],
        index: u32,
    ) -> IdentityResult<Vec<u8>> {
        let key = active(ctx, id)?;
        let entry = keys::get_key(ctx, &key, index)?;
        if entry.revoked {
            return Err(IdentityError::NotFound(format!(
                "key #{index} of {} is revoked",
                key.display()
            )));
        }
        Ok(entry.key)
    }

    /// Services, oldest first.
    pub fn get_services(&self, ctx: &NativeContext<'_>, id: &[u8]) -> IdentityResult<Vec<Service>> {
        services::list(ctx, &active(ctx, id)?)
    }

    pub fn get_service(
        &self,
        ctx: &NativeContext<'_>,
        id: &[u8],
        service_id: &[u8],
    ) -> IdentityResult<Option<Service>> {
        services::get(ctx, &active(ctx, id)?, service_id)
    }

    /// Default contexts followed by the identity's own.
    pub fn get_contexts(&self, ctx: &NativeContext<'_>, id: &[u8]) -> IdentityResult<Vec<String>> {
        contexts::with_defaults(ctx, &active(ctx, id)?)
    }

    pub fn get_key_state(
        &self,
        ctx: &NativeContext<'_>,
        id: &[u8],
        index: u32,
    ) -> IdentityResult<KeyState> {
        let key = active(ctx, id)?;
        match keys::get_key(ctx, &key, index) {
            Ok(entry) if entry.revoked => Ok(KeyState::Revoked),
            Ok(_) => Ok(KeyState::InUse),
            Err(IdentityError::NotFound(_)) => Ok(KeyState::NotExist),
            Err(e) => Err(e),
        }
    }

    pub fn get_controller(
        &self,
        ctx: &NativeContext<'_>,
        id: &[u8],
    ) -> IdentityResult<Option<Controller>> {
        controller::get(ctx, &active(ctx, id)?)
    }

    pub fn get_recovery(
        &self,
        ctx: &NativeContext<'_>,
        id: &[u8],
    ) -> IdentityResult<Option<Group>> {
        recovery::get(ctx, &active(ctx, id)?)
    }

    /// The identity's document. A revoked identity resolves to an empty
    /// document in state `Revoked`.
    pub fn get_document(&self, ctx: &NativeContext<'_>, id: &[u8]) -> IdentityResult<Document> {
        let key = IdentityKey::new(id)?;
        let state = state::state(ctx, &key)?;
        if state == IdentityState::Unregistered {
            return Err(IdentityError::NotRegistered(key.display()));
        }
        let public_keys = keys::list_keys(ctx, &key)?;
        let attributes = attributes::list(ctx, &key).collect::<IdentityResult<Vec<_>>>()?;
        Ok(Document::new(
            id,
            state,
            &public_keys,
            &attributes,
            controller::get(ctx, &key)?,
            recovery::get(ctx, &key)?,
        )
        .with_contexts(contexts::with_defaults(ctx, &key)?)
        .with_services(&services::list(ctx, &key)?))
    }
}

// ---------------------------------------------------------------------------
// Shared steps
// ---------------------------------------------------------------------------

fn active(ctx: &NativeContext<'_>, id: &[u8]) -> IdentityResult<IdentityKey> {
    let key = IdentityKey::new(id)?;
    state::require_active(ctx, &key)?;
    Ok(key)
}

/// Turn an authorization failure into `false`; other errors still fail.
fn rejected_as_false(result: IdentityResult<()>) -> IdentityResult<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(IdentityError::AuthorizationFailed(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

fn add_key_and_notify(
    ctx: &mut NativeContext<'_>,
    key: &IdentityKey,
    public_key: &[u8],
    access: KeyAccess,
) -> IdentityResult<u32> {
    let index = keys::add_key(ctx, key, public_key, access)?;
    ctx.notify(Event::new(
        "KeyAdded",
        vec![
            key.hex(),
            hex::encode(public_key),
            index.to_string(),
            access.code().to_string(),
        ],
    ));
    Ok(index)
}

fn revoke_key_and_notify(
    ctx: &mut NativeContext<'_>,
    key: &IdentityKey,
    index: u32,
) -> IdentityResult<()> {
    let entry = keys::revoke_key(ctx, key, index)?;
    ctx.notify(Event::new(
        "KeyRemoved",
        vec![key.hex(), hex::encode(&entry.key), index.to_string()],
    ));
    Ok(())
}

fn upsert_all(
    ctx: &mut NativeContext<'_>,
    key: &IdentityKey,
    batch: &[Attribute],
) -> IdentityResult<()> {
    if batch.is_empty() {
        return Ok(());
    }
    for attribute in batch {
        attributes::upsert(ctx, key, attribute)?;
    }
    let mut fields = vec![key.hex()];
    fields.extend(batch.iter().map(|a| hex::encode(&a.key)));
    ctx.notify(Event::new("AttributeAdded", fields));
    Ok(())
}

fn remove_attribute_and_notify(
    ctx: &mut NativeContext<'_>,
    key: &IdentityKey,
    attribute_key: &[u8],
) -> IdentityResult<()> {
    if !attributes::remove(ctx, key, attribute_key)? {
        return Err(IdentityError::NotFound(format!(
            "attribute {} of {}",
            hex::encode(attribute_key),
            key.display()
        )));
    }
    ctx.notify(Event::new(
        "AttributeRemoved",
        vec![key.hex(), hex::encode(attribute_key)],
    ));
    Ok(())
}

fn service_event(key: &IdentityKey, name: &str, service_id: &[u8]) -> Event {
    Event::new(name, vec![key.hex(), hex::encode(service_id)])
}

fn context_event(key: &IdentityKey, name: &str, changed: &[Vec<u8>]) -> Option<Event> {
    if changed.is_empty() {
        return None;
    }
    let mut fields = vec![key.hex()];
    fields.extend(changed.iter().map(hex::encode));
    Some(Event::new(name, fields))
}

fn controller_event(key: &IdentityKey, action: &str, controller: Option<&Controller>) -> Event {
    let mut fields = vec![key.hex(), action.to_string()];
    if let Some(c) = controller {
        fields.push(hex::encode(c.to_bytes()));
    }
    Event::new("ControllerChanged", fields)
}
