//! Keyed Children Diff
//!
//! Reconciles two sibling lists with as few host moves as possible.
//!
//! # Algorithm
//!
//! 1. Patch the common prefix: walk both lists from the head while the
//!    nodes are the same type.
//!
//! 2. Patch the common suffix the same way, from the tail.
//!
//! 3. If only new nodes are left, mount them before the node that follows
//!    the range. If only old nodes are left, unmount them.
//!
//! 4. Otherwise map every remaining new key to its index, walk the
//!    remaining old nodes once, and record for each new position which old
//!    node (if any) it corresponds to. Old nodes without a counterpart are
//!    unmounted; matched ones are patched in place.
//!
//! 5. If the matched old indices are not already increasing, compute the
//!    longest increasing subsequence of the correspondence. Those nodes stay
//!    put. Walking the new range backward, every other matched node is moved
//!    before its successor and every unmatched position is mounted fresh.
//!
//! Unkeyed nodes in the middle range are matched to the first unclaimed
//! unkeyed new node of the same type.

use std::collections::HashMap;

use tracing::{trace, warn};

use super::handle::NodeHandle;
use super::host::HostAdapter;
use super::renderer::Renderer;
use super::vnode::{Key, VNode};
use crate::error::RenderError;

impl<H> Renderer<H>
where
    H: HostAdapter + Send + 'static,
{
    /// Patch `old` into `new` inside `container`. Nodes appended at the end
    /// go before `parent_anchor`.
    pub(super) fn patch_keyed_children(
        &self,
        old: &mut [VNode],
        new: &mut [VNode],
        container: NodeHandle,
        parent_anchor: Option<NodeHandle>,
    ) {
        let mut start = 0;
        let mut old_end = old.len();
        let mut new_end = new.len();

        // 1. Common prefix
        while start < old_end && start < new_end && old[start].is_same_type(&new[start]) {
            self.patch(Some(&mut old[start]), &mut new[start], container, None);
            start += 1;
        }

        // 2. Common suffix
        while start < old_end
            && start < new_end
            && old[old_end - 1].is_same_type(&new[new_end - 1])
        {
            self.patch(
                Some(&mut old[old_end - 1]),
                &mut new[new_end - 1],
                container,
                None,
            );
            old_end -= 1;
            new_end -= 1;
        }

        // 3. Pure insertion or pure removal
        if start >= old_end {
            if start < new_end {
                let anchor = self.anchor_after(new, new_end, parent_anchor);
                for node in &mut new[start..new_end] {
                    self.patch(None, node, container, anchor);
                }
            }
            return;
        }
        if start >= new_end {
            for node in &mut old[start..old_end] {
                self.unmount(node, true);
            }
            return;
        }

        // 4. Match the unprocessed middle ranges
        let old_start = start;
        let new_start = start;
        let mut key_to_new_index: HashMap<Key, usize> = HashMap::new();
        for (index, node) in new.iter().enumerate().take(new_end).skip(new_start) {
            if let Some(key) = &node.key {
                if key_to_new_index.insert(key.clone(), index).is_some() {
                    self.report_duplicate_key(key);
                }
            }
        }

        let to_be_patched = new_end - new_start;
        let mut patched = 0;
        let mut moved = false;
        let mut max_new_index_so_far = 0;
        // 0 means "no old node"; otherwise old index + 1.
        let mut new_index_to_old_index = vec![0usize; to_be_patched];

        for old_index in old_start..old_end {
            if patched >= to_be_patched {
                self.unmount(&mut old[old_index], true);
                continue;
            }

            let found = match &old[old_index].key {
                Some(key) => key_to_new_index.get(key).copied(),
                None => (new_start..new_end).find(|&index| {
                    new_index_to_old_index[index - new_start] == 0
                        && new[index].key.is_none()
                        && old[old_index].is_same_type(&new[index])
                }),
            };

            match found {
                Some(new_index) if new_index_to_old_index[new_index - new_start] == 0 => {
                    new_index_to_old_index[new_index - new_start] = old_index + 1;
                    if new_index >= max_new_index_so_far {
                        max_new_index_so_far = new_index;
                    } else {
                        moved = true;
                    }
                    self.patch(Some(&mut old[old_index]), &mut new[new_index], container, None);
                    patched += 1;
                }
                Some(_) => {
                    if let Some(key) = &old[old_index].key {
                        self.report_duplicate_key(key);
                    }
                    self.unmount(&mut old[old_index], true);
                }
                None => self.unmount(&mut old[old_index], true),
            }
        }

        // 5. Move and mount, back to front
        let stable = if moved {
            longest_increasing_subsequence(&new_index_to_old_index)
        } else {
            Vec::new()
        };
        let mut stable_cursor = stable.len();
        let mut moves = 0;

        for offset in (0..to_be_patched).rev() {
            let index = new_start + offset;
            let anchor = self.anchor_after(new, index + 1, parent_anchor);

            if new_index_to_old_index[offset] == 0 {
                self.patch(None, &mut new[index], container, anchor);
            } else if moved {
                if stable_cursor > 0 && stable[stable_cursor - 1] == offset {
                    stable_cursor -= 1;
                } else {
                    self.move_node(&new[index], container, anchor);
                    moves += 1;
                }
            }
        }

        trace!(
            old = old.len(),
            new = new.len(),
            patched,
            moves,
            "keyed diff"
        );
    }

    /// First host node of `nodes[index]`, or `parent_anchor` past the end.
    fn anchor_after(
        &self,
        nodes: &[VNode],
        index: usize,
        parent_anchor: Option<NodeHandle>,
    ) -> Option<NodeHandle> {
        match nodes.get(index) {
            Some(node) => self.host_node(node),
            None => parent_anchor,
        }
    }

    fn report_duplicate_key(&self, key: &Key) {
        if self.config().warn_on_duplicate_keys {
            let err = RenderError::DuplicateKey { key: key.clone() };
            warn!(error = %err, "keyed diff continues with best-effort matching");
        }
    }
}

/// Indices of a longest strictly increasing subsequence of `values`,
/// ignoring zeros.
///
/// Patience sorting with predecessor links, `O(n log n)`.
///
/// ```rust
/// use sprig_core::render::longest_increasing_subsequence;
///
/// assert_eq!(longest_increasing_subsequence(&[3, 1, 2, 0, 4]), vec![1, 2, 4]);
/// ```
pub fn longest_increasing_subsequence(values: &[usize]) -> Vec<usize> {
    let mut predecessors: Vec<Option<usize>> = vec![None; values.len()];
    // tails[k] = index of the smallest tail of an increasing run of length k + 1
    let mut tails: Vec<usize> = Vec::new();

    for (index, &value) in values.iter().enumerate() {
        if value == 0 {
            continue;
        }
        let position = tails.partition_point(|&tail| values[tail] < value);
        if position > 0 {
            predecessors[index] = Some(tails[position - 1]);
        }
        if position == tails.len() {
            tails.push(index);
        } else {
            tails[position] = index;
        }
    }

    let mut sequence = Vec::with_capacity(tails.len());
    let mut current = tails.last().copied();
    while let Some(index) = current {
        sequence.push(index);
        current = predecessors[index];
    }
    sequence.reverse();
    sequence
}
