//! # Service Endpoints
//!
//! Services an identity advertises in its document, stored as a linked
//! list keyed by service id. Adding an id twice is an error and updating a
//! missing id is an error; an update rewrites the node in place, so a
//! service keeps its position. Documents list services oldest first.

use sovid_protocol::codec::{Sink, Source};
use sovid_protocol::config::{
    FIELD_SERVICES, MAX_SERVICE_ENDPOINT_SIZE, MAX_SERVICE_ID_SIZE, MAX_SERVICE_TYPE_SIZE,
};
use sovid_protocol::host::NativeContext;

use crate::error::{IdentityError, IdentityResult};
use crate::linked_list::LinkedList;
use crate::state::IdentityKey;

/// One service record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub id: Vec<u8>,
    pub service_type: Vec<u8>,
    pub endpoint: Vec<u8>,
}

impl Service {
    pub fn new(
        id: impl Into<Vec<u8>>,
        service_type: impl Into<Vec<u8>>,
        endpoint: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            id: id.into(),
            service_type: service_type.into(),
            endpoint: endpoint.into(),
        }
    }

    pub fn validate(&self) -> IdentityResult<()> {
        check_len("service id", &self.id, 1, MAX_SERVICE_ID_SIZE)?;
        check_len("service type", &self.service_type, 0, MAX_SERVICE_TYPE_SIZE)?;
        check_len("service endpoint", &self.endpoint, 1, MAX_SERVICE_ENDPOINT_SIZE)
    }

    /// Wire form: `varbytes(id) ‖ varbytes(type) ‖ varbytes(endpoint)`.
    pub fn decode(src: &mut Source<'_>) -> IdentityResult<Self> {
        let id = src.read_var_bytes()?.to_vec();
        let service_type = src.read_var_bytes()?.to_vec();
        let endpoint = src.read_var_bytes()?.to_vec();
        Ok(Self {
            id,
            service_type,
            endpoint,
        })
    }

    fn encode_payload(&self) -> Vec<u8> {
        let mut sink = Sink::new();
        sink.write_var_bytes(&self.service_type)
            .write_var_bytes(&self.endpoint);
        sink.into_bytes()
    }

    fn decode_payload(id: Vec<u8>, payload: &[u8]) -> IdentityResult<Self> {
        let mut src = Source::new(payload);
        let service_type = src.read_var_bytes()?.to_vec();
        let endpoint = src.read_var_bytes()?.to_vec();
        src.finish()?;
        Ok(Self {
            id,
            service_type,
            endpoint,
        })
    }
}

fn check_len(what: &str, bytes: &[u8], min: usize, max: usize) -> IdentityResult<()> {
    if bytes.len() < min || bytes.len() > max {
        return Err(IdentityError::ValidationFailed(format!(
            "{what} length {} outside {min}..={max}",
            bytes.len()
        )));
    }
    Ok(())
}

fn service_list(id: &IdentityKey) -> LinkedList {
    LinkedList::new(id.field(FIELD_SERVICES))
}

/// Add a new service. Fails with `DuplicateEntry` if the id is taken.
pub fn add(ctx: &mut NativeContext<'_>, id: &IdentityKey, service: &Service) -> IdentityResult<()> {
    service.validate()?;
    let list = service_list(id);
    if list.find(ctx, &service.id)?.is_some() {
        return Err(IdentityError::DuplicateEntry(format!(
            "service {} of {}",
            String::from_utf8_lossy(&service.id),
            id.display()
        )));
    }
    list.insert(ctx, &service.id, &service.encode_payload())?;
    tracing::debug!(did = %id.display(), service = %hex::encode(&service.id), "service added");
    Ok(())
}

/// Replace the type and endpoint of an existing service.
pub fn update(
    ctx: &mut NativeContext<'_>,
    id: &IdentityKey,
    service: &Service,
) -> IdentityResult<()> {
    service.validate()?;
    let list = service_list(id);
    if list.find(ctx, &service.id)?.is_none() {
        return Err(not_found(id, &service.id));
    }
    list.update(ctx, &service.id, &service.encode_payload())
}

/// Remove a service. Fails with `NotFound` if it is absent.
pub fn remove(ctx: &mut NativeContext<'_>, id: &IdentityKey, service_id: &[u8]) -> IdentityResult<()> {
    if !service_list(id).delete(ctx, service_id)? {
        return Err(not_found(id, service_id));
    }
    Ok(())
}

pub fn get(
    ctx: &NativeContext<'_>,
    id: &IdentityKey,
    service_id: &[u8],
) -> IdentityResult<Option<Service>> {
    match service_list(id).find(ctx, service_id)? {
        Some(node) => Service::decode_payload(service_id.to_vec(), &node.payload).map(Some),
        None => Ok(None),
    }
}

/// Every service, oldest first.
pub fn list(ctx: &NativeContext<'_>, id: &IdentityKey) -> IdentityResult<Vec<Service>> {
    let mut services = service_list(id)
        .iter(ctx)
        .map(|node| {
            let (item, payload) = node?;
            Service::decode_payload(item, &payload)
        })
        .collect::<IdentityResult<Vec<_>>>()?;
    services.reverse();
    Ok(services)
}

pub(crate) fn clear(ctx: &mut NativeContext<'_>, id: &IdentityKey) -> IdentityResult<usize> {
    service_list(id).clear(ctx)
}

fn not_found(id: &IdentityKey, service_id: &[u8]) -> IdentityError {
    IdentityError::NotFound(format!(
        "service {} of {}",
        String::from_utf8_lossy(service_id),
        id.display()
    ))
}
