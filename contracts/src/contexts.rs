//! # JSON-LD Contexts
//!
//! Extra `@context` entries of an identity's document, kept as one ordered
//! record:
//!
//! ```text
//! varuint(n) ‖ n × varbytes(context)
//! ```
//!
//! Adding is idempotent. Entries already stored, repeated within the
//! batch, or among [`DEFAULT_CONTEXTS`] are skipped. Removing ignores
//! entries that are not stored. Both return what actually changed.

use sovid_protocol::codec::{Sink, Source};
use sovid_protocol::config::{DEFAULT_CONTEXTS, FIELD_CONTEXTS, MAX_CONTEXT_SIZE};
use sovid_protocol::host::NativeContext;

use crate::error::{IdentityError, IdentityResult, StorageContext};
use crate::state::IdentityKey;

/// Batch wire form, shared by the stored record and requests.
pub fn encode_list(contexts: &[Vec<u8>], sink: &mut Sink) {
    sink.write_var_uint(contexts.len() as u64);
    for context in contexts {
        sink.write_var_bytes(context);
    }
}

pub fn decode_list(src: &mut Source<'_>) -> IdentityResult<Vec<Vec<u8>>> {
    let count = src.read_var_uint()?;
    if count > src.remaining() as u64 {
        return Err(IdentityError::ValidationFailed(format!(
            "context count {count} exceeds input"
        )));
    }
    (0..count)
        .map(|_| Ok(src.read_var_bytes()?.to_vec()))
        .collect()
}

fn validate(context: &[u8]) -> IdentityResult<()> {
    if context.is_empty() || context.len() > MAX_CONTEXT_SIZE {
        return Err(IdentityError::ValidationFailed(format!(
            "context length {} outside 1..={MAX_CONTEXT_SIZE}",
            context.len()
        )));
    }
    Ok(())
}

fn is_default(context: &[u8]) -> bool {
    DEFAULT_CONTEXTS.iter().any(|d| d.as_bytes() == context)
}

/// The identity's own contexts, in insertion order.
pub fn list(ctx: &NativeContext<'_>, id: &IdentityKey) -> IdentityResult<Vec<Vec<u8>>> {
    match ctx.get(&id.field(FIELD_CONTEXTS)).during("read contexts")? {
        None => Ok(Vec::new()),
        Some(bytes) => {
            let mut src = Source::new(&bytes);
            let contexts = decode_list(&mut src)?;
            src.finish()?;
            Ok(contexts)
        }
    }
}

fn store(ctx: &mut NativeContext<'_>, id: &IdentityKey, contexts: &[Vec<u8>]) -> IdentityResult<()> {
    let key = id.field(FIELD_CONTEXTS);
    if contexts.is_empty() {
        return ctx.delete(&key).during("clear contexts");
    }
    let mut sink = Sink::new();
    encode_list(contexts, &mut sink);
    ctx.put(&key, sink.as_bytes()).during("write contexts")
}

/// Append new contexts. Returns the ones actually added.
pub fn add(
    ctx: &mut NativeContext<'_>,
    id: &IdentityKey,
    batch: &[Vec<u8>],
) -> IdentityResult<Vec<Vec<u8>>> {
    for context in batch {
        validate(context)?;
    }
    let mut stored = list(ctx, id)?;
    let mut added: Vec<Vec<u8>> = Vec::new();
    for context in batch {
        if is_default(context) || stored.contains(context) {
            continue;
        }
        stored.push(context.clone());
        added.push(context.clone());
    }
    if !added.is_empty() {
        store(ctx, id, &stored)?;
    }
    Ok(added)
}

/// Drop contexts. Returns the ones actually removed.
pub fn remove(
    ctx: &mut NativeContext<'_>,
    id: &IdentityKey,
    batch: &[Vec<u8>],
) -> IdentityResult<Vec<Vec<u8>>> {
    let (removed, remain): (Vec<_>, Vec<_>) =
        list(ctx, id)?.into_iter().partition(|c| batch.contains(c));
    if !removed.is_empty() {
        store(ctx, id, &remain)?;
    }
    Ok(removed)
}

/// Defaults followed by the identity's own contexts, as document strings.
pub fn with_defaults(ctx: &NativeContext<'_>, id: &IdentityKey) -> IdentityResult<Vec<String>> {
    let mut out: Vec<String> = DEFAULT_CONTEXTS.iter().map(|c| c.to_string()).collect();
    out.extend(
        list(ctx, id)?
            .iter()
            .map(|c| String::from_utf8_lossy(c).into_owned()),
    );
    Ok(out)
}

pub(crate) fn clear(ctx: &mut NativeContext<'_>, id: &IdentityKey) -> IdentityResult<()> {
    store(ctx, id, &[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::Harness;

    fn id() -> IdentityKey {
        IdentityKey::new(b"did:sov:ctx").unwrap()
    }

    fn batch(items: &[&str]) -> Vec<Vec<u8>> {
        items.iter().map(|s| s.as_bytes().to_vec()).collect()
    }

    #[test]
    fn add_skips_defaults_and_repeats() {
        let mut h = Harness::new();
        let mut ctx = h.ctx();
        let id = id();

        let added = add(
            &mut ctx,
            &id,
            &batch(&["https://a.example", DEFAULT_CONTEXTS[0], "https://a.example"]),
        )
        .unwrap();
        assert_eq!(added, batch(&["https://a.example"]));

        let added = add(&mut ctx, &id, &batch(&["https://a.example", "https://b.example"])).unwrap();
        assert_eq!(added, batch(&["https://b.example"]));
        assert_eq!(
            list(&ctx, &id).unwrap(),
            batch(&["https://a.example", "https://b.example"])
        );
        assert_eq!(
            with_defaults(&ctx, &id).unwrap(),
            vec![DEFAULT_CONTEXTS[0], "https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn remove_reports_only_stored_entries() {
        let mut h = Harness::new();
        let mut ctx = h.ctx();
        let id = id();
        add(&mut ctx, &id, &batch(&["https://a.example", "https://b.example"])).unwrap();

        let removed = remove(&mut ctx, &id, &batch(&["https://b.example", "https://zz.example"]))
            .unwrap();
        assert_eq!(removed, batch(&["https://b.example"]));
        assert_eq!(list(&ctx, &id).unwrap(), batch(&["https://a.example"]));

        remove(&mut ctx, &id, &batch(&["https://a.example"])).unwrap();
        assert!(ctx.get(&id.field(FIELD_CONTEXTS)).unwrap().is_none());
    }

    #[test]
    fn invalid_entry_rejects_whole_batch() {
        let mut h = Harness::new();
        let mut ctx = h.ctx();
        let id = id();
        let mut items = batch(&["https://a.example"]);
        items.push(Vec::new());
        assert!(matches!(
            add(&mut ctx, &id, &items),
            Err(IdentityError::ValidationFailed(_))
        ));
        assert!(list(&ctx, &id).unwrap().is_empty());
    }

    #[test]
    fn count_larger_than_input_rejected() {
        let mut sink = Sink::new();
        sink.write_var_uint(500);
        let bytes = sink.into_bytes();
        assert!(decode_list(&mut Source::new(&bytes)).is_err());
    }
}
