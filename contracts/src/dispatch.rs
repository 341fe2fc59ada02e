//! Method-name dispatch over raw request bytes.
//!
//! Requests are a flat sequence of `varbytes` and `varuint` fields in the
//! order `[identity][fields][signer index | signer list]`. Controller-path
//! calls end with whatever proof the stored controller expects: a key
//! index for a single controller, a `varbytes`-wrapped signer list for a
//! group. The `addKey*` calls may append an access-level `varuint` after
//! the proof; without it the key gets `All`. Other trailing bytes are
//! rejected.
//!
//! Mutations answer `[0x01]`. Boolean queries answer `[0x00]` or `[0x01]`,
//! `getPublicKeyById` answers the raw key bytes and the rest answer JSON.

use serde::Serialize;

use sovid_protocol::codec::Source;
use sovid_protocol::config::{BYTE_FALSE, BYTE_TRUE};
use sovid_protocol::host::NativeContext;

use crate::attributes::Attribute;
use crate::contexts;
use crate::controller::{self, Controller, ControllerAuth};
use crate::document::{AttributeView, ServiceView};
use crate::error::{IdentityError, IdentityResult};
use crate::group::{Group, Signer};
use crate::keys::{to_index, KeyAccess};
use crate::registry::IdentityRegistry;
use crate::services::Service;
use crate::state::IdentityKey;

/// Every method name [`IdentityRegistry::invoke`] accepts.
pub const METHODS: &[&str] = &[
    "register",
    "registerWithAttributes",
    "registerWithController",
    "addKey",
    "removeKey",
    "addAttributes",
    "removeAttribute",
    "setKeyAccess",
    "setController",
    "removeController",
    "addKeyByController",
    "removeKeyByController",
    "addAttributesByController",
    "removeAttributeByController",
    "verifyController",
    "setRecovery",
    "updateRecovery",
    "addKeyByRecovery",
    "removeKeyByRecovery",
    "revoke",
    "verifySignature",
    "getPublicKeys",
    "getAttributes",
    "getKeyState",
    "getController",
    "getRecovery",
    "getDocument",
    "addService",
    "updateService",
    "removeService",
    "addContext",
    "removeContext",
    "getAttributeByKey",
    "getPublicKeyById",
    "getService",
    "getServices",
    "getContexts",
];

/// Field reader over one request.
struct Request<'a> {
    src: Source<'a>,
}

impl<'a> Request<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self {
            src: Source::new(input),
        }
    }

    fn bytes(&mut self) -> IdentityResult<&'a [u8]> {
        Ok(self.src.read_var_bytes()?)
    }

    fn index(&mut self) -> IdentityResult<u32> {
        to_index(self.src.read_var_uint()?)
    }

    fn access(&mut self) -> IdentityResult<KeyAccess> {
        KeyAccess::from_code(self.src.read_var_uint()?)
    }

    /// Optional access level after the proof of an `addKey*` call; `All`
    /// when the request ends first.
    fn trailing_access(&mut self) -> IdentityResult<KeyAccess> {
        if self.src.remaining() == 0 {
            return Ok(KeyAccess::All);
        }
        self.access()
    }

    fn attributes(&mut self) -> IdentityResult<Vec<Attribute>> {
        Attribute::decode_batch(&mut self.src)
    }

    fn service(&mut self) -> IdentityResult<Service> {
        Service::decode(&mut self.src)
    }

    fn contexts(&mut self) -> IdentityResult<Vec<Vec<u8>>> {
        contexts::decode_list(&mut self.src)
    }

    fn group(&mut self) -> IdentityResult<Group> {
        Group::from_bytes(self.bytes()?)
    }

    fn controller(&mut self) -> IdentityResult<Controller> {
        Controller::from_bytes(self.bytes()?)
    }

    fn signers(&mut self) -> IdentityResult<Vec<Signer>> {
        Signer::decode_list(self.bytes()?)
    }

    /// Proof for `controller`.
    fn auth_for(&mut self, controller: &Controller) -> IdentityResult<ControllerAuth> {
        controller.decode_auth(&mut self.src)
    }

    /// Proof for the controller currently stored for `id`.
    fn stored_auth(&mut self, ctx: &NativeContext<'_>, id: &[u8]) -> IdentityResult<ControllerAuth> {
        let key = IdentityKey::new(id)?;
        match controller::get(ctx, &key)? {
            Some(c) => self.auth_for(&c),
            None => Err(IdentityError::AuthorizationFailed(format!(
                "{} has no controller",
                key.display()
            ))),
        }
    }

    fn finish(&self) -> IdentityResult<()> {
        Ok(self.src.finish()?)
    }
}

fn json<T: Serialize>(value: &T) -> IdentityResult<Vec<u8>> {
    serde_json::to_vec(value)
        .map_err(|e| IdentityError::ValidationFailed(format!("result encoding: {e}")))
}

fn flag(value: bool) -> Vec<u8> {
    let byte = if value { BYTE_TRUE } else { BYTE_FALSE };
    byte.to_vec()
}

impl IdentityRegistry {
    /// Decode `input` for `method` and run it.
    pub fn invoke(
        &self,
        ctx: &mut NativeContext<'_>,
        method: &str,
        input: &[u8],
    ) -> IdentityResult<Vec<u8>> {
        tracing::debug!(method, input_len = input.len(), "invoke");
        let mut req = Request::new(input);
        let id = req.bytes()?;

        let output = match method {
            "register" => {
                let pk = req.bytes()?;
                req.finish()?;
                self.register(ctx, id, pk)?;
                None
            }
            "registerWithAttributes" => {
                let pk = req.bytes()?;
                let attrs = req.attributes()?;
                req.finish()?;
                self.register_with_attributes(ctx, id, pk, &attrs)?;
                None
            }
            "registerWithController" => {
                let controller = req.controller()?;
                let auth = req.auth_for(&controller)?;
                req.finish()?;
                self.register_with_controller(ctx, id, &controller, &auth)?;
                None
            }
            "addKey" => {
                let pk = req.bytes()?;
                let signer = req.index()?;
                let access = req.trailing_access()?;
                req.finish()?;
                self.add_key(ctx, id, pk, access, signer)?;
                None
            }
            "removeKey" => {
                let index = req.index()?;
                let signer = req.index()?;
                req.finish()?;
                self.remove_key(ctx, id, index, signer)?;
                None
            }
            "addAttributes" => {
                let attrs = req.attributes()?;
                let signer = req.index()?;
                req.finish()?;
                self.add_attributes(ctx, id, &attrs, signer)?;
                None
            }
            "removeAttribute" => {
                let key = req.bytes()?;
                let signer = req.index()?;
                req.finish()?;
                self.remove_attribute(ctx, id, key, signer)?;
                None
            }
            "setKeyAccess" => {
                let index = req.index()?;
                let access = req.access()?;
                let signer = req.index()?;
                req.finish()?;
                self.set_key_access(ctx, id, index, access, signer)?;
                None
            }
            "setController" => {
                let controller = req.controller()?;
                let signer = req.index()?;
                req.finish()?;
                self.set_controller(ctx, id, &controller, signer)?;
                None
            }
            "removeController" => {
                let auth = req.stored_auth(ctx, id)?;
                req.finish()?;
                self.remove_controller(ctx, id, &auth)?;
                None
            }
            "addKeyByController" => {
                let pk = req.bytes()?;
                let auth = req.stored_auth(ctx, id)?;
                let access = req.trailing_access()?;
                req.finish()?;
                self.add_key_by_controller(ctx, id, pk, access, &auth)?;
                None
            }
            "removeKeyByController" => {
                let index = req.index()?;
                let auth = req.stored_auth(ctx, id)?;
                req.finish()?;
                self.remove_key_by_controller(ctx, id, index, &auth)?;
                None
            }
            "addAttributesByController" => {
                let attrs = req.attributes()?;
                let auth = req.stored_auth(ctx, id)?;
                req.finish()?;
                self.add_attributes_by_controller(ctx, id, &attrs, &auth)?;
                None
            }
            "removeAttributeByController" => {
                let key = req.bytes()?;
                let auth = req.stored_auth(ctx, id)?;
                req.finish()?;
                self.remove_attribute_by_controller(ctx, id, key, &auth)?;
                None
            }
            "verifyController" => {
                let auth = req.stored_auth(ctx, id)?;
                req.finish()?;
                Some(flag(self.verify_controller(ctx, id, &auth)?))
            }
            "setRecovery" => {
                let group = req.group()?;
                let signer = req.index()?;
                req.finish()?;
                self.set_recovery(ctx, id, &group, signer)?;
                None
            }
            "updateRecovery" => {
                let group = req.group()?;
                let signers = req.signers()?;
                req.finish()?;
                self.update_recovery(ctx, id, &group, &signers)?;
                None
            }
            "addKeyByRecovery" => {
                let pk = req.bytes()?;
                let signers = req.signers()?;
                let access = req.trailing_access()?;
                req.finish()?;
                self.add_key_by_recovery(ctx, id, pk, access, &signers)?;
                None
            }
            "removeKeyByRecovery" => {
                let index = req.index()?;
                let signers = req.signers()?;
                req.finish()?;
                self.remove_key_by_recovery(ctx, id, index, &signers)?;
                None
            }
            "revoke" => {
                let auth = req.stored_auth(ctx, id)?;
                req.finish()?;
                self.revoke(ctx, id, &auth)?;
                None
            }
            "verifySignature" => {
                let index = req.index()?;
                req.finish()?;
                Some(flag(self.verify_signature(ctx, id, index)?))
            }
            "getPublicKeys" => {
                req.finish()?;
                Some(json(&self.get_public_keys(ctx, id)?)?)
            }
            "getAttributes" => {
                req.finish()?;
                let views: Vec<AttributeView> = self
                    .get_attributes(ctx, id)?
                    .iter()
                    .map(AttributeView::from)
                    .collect();
                Some(json(&views)?)
            }
            "getKeyState" => {
                let index = req.index()?;
                req.finish()?;
                Some(json(&self.get_key_state(ctx, id, index)?)?)
            }
            "getController" => {
                req.finish()?;
                Some(json(&self.get_controller(ctx, id)?)?)
            }
            "getRecovery" => {
                req.finish()?;
                Some(json(&self.get_recovery(ctx, id)?)?)
            }
            "getDocument" => {
                req.finish()?;
                Some(json(&self.get_document(ctx, id)?)?)
            }
            "addService" => {
                let service = req.service()?;
                let signer = req.index()?;
                req.finish()?;
                self.add_service(ctx, id, &service, signer)?;
                None
            }
            "updateService" => {
                let service = req.service()?;
                let signer = req.index()?;
                req.finish()?;
                self.update_service(ctx, id, &service, signer)?;
                None
            }
            "removeService" => {
                let service_id = req.bytes()?;
                let signer = req.index()?;
                req.finish()?;
                self.remove_service(ctx, id, service_id, signer)?;
                None
            }
            "addContext" => {
                let batch = req.contexts()?;
                let signer = req.index()?;
                req.finish()?;
                self.add_contexts(ctx, id, &batch, signer)?;
                None
            }
            "removeContext" => {
                let batch = req.contexts()?;
                let signer = req.index()?;
                req.finish()?;
                self.remove_contexts(ctx, id, &batch, signer)?;
                None
            }
            "getAttributeByKey" => {
                let key = req.bytes()?;
                req.finish()?;
                let attribute = self.get_attribute_by_key(ctx, id, key)?;
                Some(json(&AttributeView::from(&attribute))?)
            }
            "getPublicKeyById" => {
                let index = req.index()?;
                req.finish()?;
                Some(self.get_public_key_by_id(ctx, id, index)?)
            }
            "getService" => {
                let service_id = req.bytes()?;
                req.finish()?;
                let did = String::from_utf8_lossy(id);
                let view = self
                    .get_service(ctx, id, service_id)?
                    .map(|s| ServiceView::new(&did, &s));
                Some(json(&view)?)
            }
            "getServices" => {
                req.finish()?;
                let did = String::from_utf8_lossy(id);
                let views: Vec<ServiceView> = self
                    .get_services(ctx, id)?
                    .iter()
                    .map(|s| ServiceView::new(&did, s))
                    .collect();
                Some(json(&views)?)
            }
            "getContexts" => {
                req.finish()?;
                Some(json(&self.get_contexts(ctx, id)?)?)
            }
            other => {
                return Err(IdentityError::ValidationFailed(format!(
                    "unknown method {other:?}"
                )))
            }
        };
        Ok(output.unwrap_or_else(|| BYTE_TRUE.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::Harness;
    use sovid_protocol::codec::Sink;
    use sovid_protocol::crypto::Keypair;
    use sovid_protocol::identity::Did;

    #[test]
    fn register_then_query_via_invoke() {
        let registry = IdentityRegistry::default();
        let mut h = Harness::new();
        let did = Did::generate("sov");
        let kp = Keypair::generate();
        h.sign_with(&[&kp]);

        let mut sink = Sink::new();
        sink.write_var_bytes(did.as_bytes())
            .write_var_bytes(&kp.public_key_bytes());
        let out = registry
            .invoke(&mut h.ctx(), "register", sink.as_bytes())
            .unwrap();
        assert_eq!(out, BYTE_TRUE);

        let mut sink = Sink::new();
        sink.write_var_bytes(did.as_bytes()).write_var_uint(1);
        let out = registry
            .invoke(&mut h.ctx(), "verifySignature", sink.as_bytes())
            .unwrap();
        assert_eq!(out, BYTE_TRUE);

        let mut sink = Sink::new();
        sink.write_var_bytes(did.as_bytes());
        let out = registry
            .invoke(&mut h.ctx(), "getPublicKeys", sink.as_bytes())
            .unwrap();
        let keys: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(keys[0]["index"], 1);
        assert_eq!(keys[0]["key"], kp.public_key_hex());
        assert_eq!(keys[0]["access"], "All");
    }

    #[test]
    fn unknown_method_and_trailing_bytes_rejected() {
        let registry = IdentityRegistry::default();
        let mut h = Harness::new();
        let mut sink = Sink::new();
        sink.write_var_bytes(b"did:sov:x");
        assert!(matches!(
            registry.invoke(&mut h.ctx(), "transfer", sink.as_bytes()),
            Err(IdentityError::ValidationFailed(_))
        ));

        let (did, _) = h.register(&registry);
        let mut sink = Sink::new();
        sink.write_var_bytes(did.as_bytes()).write_u8(0);
        assert!(matches!(
            registry.invoke(&mut h.ctx(), "getDocument", sink.as_bytes()),
            Err(IdentityError::ValidationFailed(_))
        ));
    }

    #[test]
    fn controller_call_without_controller_is_unauthorized() {
        let registry = IdentityRegistry::default();
        let mut h = Harness::new();
        let (did, _) = h.register(&registry);
        let mut sink = Sink::new();
        sink.write_var_bytes(did.as_bytes()).write_var_uint(1);
        assert!(matches!(
            registry.invoke(&mut h.ctx(), "revoke", sink.as_bytes()),
            Err(IdentityError::AuthorizationFailed(_))
        ));
    }

    #[test]
    fn add_key_takes_optional_access_level() {
        let registry = IdentityRegistry::default();
        let mut h = Harness::new();
        let (did, kp) = h.register(&registry);
        h.sign_with(&[&kp]);

        let plain = Keypair::generate();
        let mut sink = Sink::new();
        sink.write_var_bytes(did.as_bytes())
            .write_var_bytes(&plain.public_key_bytes())
            .write_var_uint(1);
        registry
            .invoke(&mut h.ctx(), "addKey", sink.as_bytes())
            .unwrap();

        let auth_only = Keypair::generate();
        let mut sink = Sink::new();
        sink.write_var_bytes(did.as_bytes())
            .write_var_bytes(&auth_only.public_key_bytes())
            .write_var_uint(1)
            .write_var_uint(u64::from(KeyAccess::AuthenticationOnly.code()));
        registry
            .invoke(&mut h.ctx(), "addKey", sink.as_bytes())
            .unwrap();
        let added = &h.events.last().unwrap().fields;
        assert_eq!(added[2], "3");
        assert_eq!(added[3], KeyAccess::AuthenticationOnly.code().to_string());

        let keys = registry.get_public_keys(&h.ctx(), did.as_bytes()).unwrap();
        assert_eq!(keys[1].access, KeyAccess::All);
        assert_eq!(keys[2].access, KeyAccess::AuthenticationOnly);

        // The new key authenticates but cannot mutate.
        h.sign_with(&[&auth_only]);
        assert!(registry.verify_signature(&h.ctx(), did.as_bytes(), 3).unwrap());
        assert!(matches!(
            registry.remove_key(&mut h.ctx(), did.as_bytes(), 2, 3),
            Err(IdentityError::AuthorizationFailed(_))
        ));

        // An unknown code is still rejected.
        h.sign_with(&[&kp]);
        let mut sink = Sink::new();
        sink.write_var_bytes(did.as_bytes())
            .write_var_bytes(b"another key")
            .write_var_uint(1)
            .write_var_uint(9);
        assert!(matches!(
            registry.invoke(&mut h.ctx(), "addKey", sink.as_bytes()),
            Err(IdentityError::ValidationFailed(_))
        ));
    }

    #[test]
    fn method_table_has_no_duplicates() {
        let mut names = METHODS.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), METHODS.len());
    }
}
