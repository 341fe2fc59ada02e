//! # Ordered Linked Store
//!
//! A singly linked list laid over a flat key-value map. Key and attribute
//! lists are both built on it.
//!
//! ```text
//! list_key              → item key of the head
//! list_key ‖ item_key   → varbytes(next item key) ‖ varbytes(payload)
//! ```
//!
//! New items are linked in at the head, so enumeration yields the most
//! recently inserted item first. There are no back-pointers: deleting an
//! item walks from the head to find its predecessor, O(n) in list length.
//! An empty `next` marks the tail.

use sovid_protocol::codec::{Sink, Source};
use sovid_protocol::host::NativeContext;

use crate::error::{IdentityError, IdentityResult, StorageContext};

/// A decoded list node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Item key of the next node; empty at the tail.
    pub next: Vec<u8>,
    pub payload: Vec<u8>,
}

impl Node {
    fn encode(&self) -> Vec<u8> {
        let mut sink = Sink::new();
        sink.write_var_bytes(&self.next).write_var_bytes(&self.payload);
        sink.into_bytes()
    }

    fn decode(bytes: &[u8]) -> IdentityResult<Self> {
        let mut src = Source::new(bytes);
        let next = src.read_var_bytes()?.to_vec();
        let payload = src.read_var_bytes()?.to_vec();
        src.finish()?;
        Ok(Self { next, payload })
    }
}

/// Handle to one list, identified by its storage key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedList {
    list_key: Vec<u8>,
}

impl LinkedList {
    pub fn new(list_key: Vec<u8>) -> Self {
        Self { list_key }
    }

    fn node_key(&self, item: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.list_key.len() + item.len());
        key.extend_from_slice(&self.list_key);
        key.extend_from_slice(item);
        key
    }

    fn set_head(&self, ctx: &mut NativeContext<'_>, item: &[u8]) -> IdentityResult<()> {
        if item.is_empty() {
            ctx.delete(&self.list_key).during("linked list clear head")
        } else {
            ctx.put(&self.list_key, item).during("linked list set head")
        }
    }

    fn put_node(&self, ctx: &mut NativeContext<'_>, item: &[u8], node: &Node) -> IdentityResult<()> {
        ctx.put(&self.node_key(item), &node.encode())
            .during("linked list write node")
    }

    /// Item key of the head, if the list is non-empty.
    pub fn head(&self, ctx: &NativeContext<'_>) -> IdentityResult<Option<Vec<u8>>> {
        ctx.get(&self.list_key).during("linked list read head")
    }

    /// Look up a node, `None` if absent.
    pub fn find(&self, ctx: &NativeContext<'_>, item: &[u8]) -> IdentityResult<Option<Node>> {
        match ctx.get(&self.node_key(item)).during("linked list read node")? {
            Some(bytes) => Node::decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Look up a node, `NotFound` if absent.
    pub fn get(&self, ctx: &NativeContext<'_>, item: &[u8]) -> IdentityResult<Node> {
        self.find(ctx, item)?.ok_or_else(|| {
            IdentityError::NotFound(format!("list item {}", hex::encode(item)))
        })
    }

    /// Link a new item in at the head.
    pub fn insert(
        &self,
        ctx: &mut NativeContext<'_>,
        item: &[u8],
        payload: &[u8],
    ) -> IdentityResult<()> {
        if item.is_empty() {
            return Err(IdentityError::ValidationFailed(
                "list item key must not be empty".into(),
            ));
        }
        if self.find(ctx, item)?.is_some() {
            return Err(IdentityError::DuplicateEntry(format!(
                "list item {}",
                hex::encode(item)
            )));
        }

        let next = self.head(ctx)?.unwrap_or_default();
        let node = Node {
            next,
            payload: payload.to_vec(),
        };
        self.put_node(ctx, item, &node)?;
        self.set_head(ctx, item)?;
        tracing::debug!(item = %hex::encode(item), "linked list insert");
        Ok(())
    }

    /// Rewrite an existing item's payload, keeping its position.
    pub fn update(
        &self,
        ctx: &mut NativeContext<'_>,
        item: &[u8],
        payload: &[u8],
    ) -> IdentityResult<()> {
        let mut node = self.get(ctx, item)?;
        node.payload = payload.to_vec();
        self.put_node(ctx, item, &node)
    }

    /// Unlink and remove an item. Returns whether it was present.
    pub fn delete(&self, ctx: &mut NativeContext<'_>, item: &[u8]) -> IdentityResult<bool> {
        let Some(head) = self.head(ctx)? else {
            return Ok(false);
        };

        if head == item {
            let node = self.get(ctx, item)?;
            self.set_head(ctx, &node.next)?;
            ctx.delete(&self.node_key(item))
                .during("linked list delete node")?;
            tracing::debug!(item = %hex::encode(item), "linked list delete head");
            return Ok(true);
        }

        let mut prev_key = head;
        loop {
            let mut prev = self.get(ctx, &prev_key)?;
            if prev.next.is_empty() {
                return Ok(false);
            }
            if prev.next == item {
                let node = self.get(ctx, item)?;
                prev.next = node.next;
                self.put_node(ctx, &prev_key, &prev)?;
                ctx.delete(&self.node_key(item))
                    .during("linked list delete node")?;
                tracing::debug!(item = %hex::encode(item), "linked list delete");
                return Ok(true);
            }
            prev_key = prev.next;
        }
    }

    /// Remove every node and the head pointer. Returns the number removed.
    pub fn clear(&self, ctx: &mut NativeContext<'_>) -> IdentityResult<usize> {
        let items = self
            .iter(ctx)
            .map(|entry| entry.map(|(item, _)| item))
            .collect::<IdentityResult<Vec<_>>>()?;
        for item in &items {
            ctx.delete(&self.node_key(item))
                .during("linked list delete node")?;
        }
        ctx.delete(&self.list_key).during("linked list clear head")?;
        Ok(items.len())
    }

    /// Walk the list from the head. The walk is not restartable: a new
    /// enumeration starts again from [`LinkedList::head`].
    pub fn iter<'c, 'a>(&self, ctx: &'c NativeContext<'a>) -> LinkedListIter<'c, 'a> {
        LinkedListIter {
            list: self.clone(),
            ctx,
            cursor: Cursor::Start,
        }
    }

    pub fn is_empty(&self, ctx: &NativeContext<'_>) -> IdentityResult<bool> {
        Ok(self.head(ctx)?.is_none())
    }
}

enum Cursor {
    Start,
    At(Vec<u8>),
    Done,
}

/// Lazy iterator over `(item_key, payload)` pairs.
pub struct LinkedListIter<'c, 'a> {
    list: LinkedList,
    ctx: &'c NativeContext<'a>,
    cursor: Cursor,
}

impl Iterator for LinkedListIter<'_, '_> {
    type Item = IdentityResult<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = match std::mem::replace(&mut self.cursor, Cursor::Done) {
            Cursor::Done => return None,
            Cursor::At(item) => item,
            Cursor::Start => match self.list.head(self.ctx) {
                Ok(Some(head)) => head,
                Ok(None) => return None,
                Err(e) => return Some(Err(e)),
            },
        };
        match self.list.get(self.ctx, &item) {
            Ok(node) => {
                if !node.next.is_empty() {
                    self.cursor = Cursor::At(node.next);
                }
                Some(Ok((item, node.payload)))
            }
            Err(e) => Some(Err(e)),
        }
    }
}
