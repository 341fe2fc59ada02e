//! JSON views returned by the query operations.
//!
//! Binary fields are hex-encoded. Attribute fields that are valid UTF-8 are
//! rendered as strings so documents stay readable.

use serde::{Serialize, Serializer};

use crate::attributes::Attribute;
use crate::controller::Controller;
use crate::error::display_id;
use crate::group::Group;
use crate::keys::{KeyAccess, PublicKeyEntry};
use crate::services::Service;
use crate::state::IdentityState;

pub(crate) fn as_hex<T: AsRef<[u8]>, S: Serializer>(bytes: &T, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&hex::encode(bytes.as_ref()))
}

pub(crate) fn as_utf8<T: AsRef<[u8]>, S: Serializer>(bytes: &T, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&display_id(bytes.as_ref()))
}

fn readable(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => hex::encode(bytes),
    }
}

/// State of one key index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KeyState {
    #[serde(rename = "not exist")]
    NotExist,
    #[serde(rename = "revoked")]
    Revoked,
    #[serde(rename = "in use")]
    InUse,
}

/// An attribute as rendered in JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeView {
    pub key: String,
    #[serde(rename = "type")]
    pub value_type: String,
    pub value: String,
}

impl From<&Attribute> for AttributeView {
    fn from(attr: &Attribute) -> Self {
        Self {
            key: readable(&attr.key),
            value_type: readable(&attr.value_type),
            value: readable(&attr.value),
        }
    }
}

/// A live key as rendered in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyView {
    pub id: String,
    pub index: u32,
    pub public_key_hex: String,
    pub access: KeyAccess,
}

impl PublicKeyView {
    pub fn new(did: &str, entry: &PublicKeyEntry) -> Self {
        Self {
            id: format!("{did}#keys-{}", entry.index),
            index: entry.index,
            public_key_hex: hex::encode(&entry.key),
            access: entry.access,
        }
    }
}

/// A service as rendered in a document: `id` is `<did>#<service id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceView {
    pub id: String,
    #[serde(rename = "type")]
    pub service_type: String,
    pub service_endpoint: String,
}

impl ServiceView {
    pub fn new(did: &str, service: &Service) -> Self {
        Self {
            id: format!("{did}#{}", readable(&service.id)),
            service_type: readable(&service.service_type),
            service_endpoint: readable(&service.endpoint),
        }
    }
}

/// The full resolvable document of an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    pub id: String,
    pub state: IdentityState,
    pub public_key: Vec<PublicKeyView>,
    /// Keys usable for authentication, by view id.
    pub authentication: Vec<String>,
    pub attribute: Vec<AttributeView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<Controller>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery: Option<Group>,
    pub service: Vec<ServiceView>,
}

impl Document {
    pub fn new(
        id: &[u8],
        state: IdentityState,
        keys: &[PublicKeyEntry],
        attributes: &[Attribute],
        controller: Option<Controller>,
        recovery: Option<Group>,
    ) -> Self {
        let did = display_id(id);
        let public_key: Vec<PublicKeyView> = keys
            .iter()
            .filter(|k| !k.revoked)
            .map(|k| PublicKeyView::new(&did, k))
            .collect();
        let authentication = public_key.iter().map(|k| k.id.clone()).collect();
        Self {
            context: Vec::new(),
            id: did,
            state,
            public_key,
            authentication,
            attribute: attributes.iter().map(AttributeView::from).collect(),
            controller,
            recovery,
            service: Vec::new(),
        }
    }

    pub fn with_contexts(mut self, contexts: Vec<String>) -> Self {
        self.context = contexts;
        self
    }

    pub fn with_services(mut self, services: &[Service]) -> Self {
        self.service = services.iter().map(|s| ServiceView::new(&self.id, s)).collect();
        self
    }
}
