//! Undo/redo replay.
//!
//! Every step resolves all of its anchors before the first mutation, so a
//! failed resolution leaves the tree untouched. Style steps that fail midway
//! restore the properties they already wrote.

use super::structure::{check_container, insertion_point_of, refresh, resolve, resolve_insertion, side_mut};
use super::{Transaction, TransactionManager, TxKind, TxType};
use crate::clock::Clock;
use crate::dom::DocumentHost;
use crate::result::{LiveditError, LiveditResult, ReplayDirection};
use tracing::warn;

impl<C: Clock> TransactionManager<C> {
    pub(super) fn replay<H: DocumentHost + ?Sized>(
        &mut self,
        host: &mut H,
        tx: &mut Transaction,
        direction: ReplayDirection,
    ) -> LiveditResult<()> {
        match tx.tx_type() {
            TxType::Style => self.replay_style(host, tx, direction),
            TxType::Text => self.replay_text(host, tx, direction),
            TxType::Class => self.replay_class(host, tx, direction),
            TxType::Move => self.replay_move(host, tx, direction),
            TxType::Structure => self.replay_structure(host, tx, direction),
        }
    }

    fn replay_style<H: DocumentHost + ?Sized>(
        &self,
        host: &mut H,
        tx: &mut Transaction,
        direction: ReplayDirection,
    ) -> LiveditResult<()> {
        let node = resolve(&*host, &source(tx, direction).locator, "element")?;
        let values = side_mut(tx, direction).styles.clone().unwrap_or_default();
        let mut written: Vec<(String, Option<String>)> = Vec::with_capacity(values.len());
        for (property, value) in &values {
            let previous = host.inline_style(node, property);
            if let Err(error) = host.set_inline_style(node, property, value.as_deref()) {
                for (property, value) in written.iter().rev() {
                    if let Err(restore) = host.set_inline_style(node, property, value.as_deref()) {
                        warn!(
                            node = %node,
                            property = %property,
                            error = %restore,
                            "could not restore style"
                        );
                    }
                }
                return Err(error);
            }
            written.push((property.clone(), previous));
        }
        refresh(&*host, node, side_mut(tx, direction), self.locator_config());
        Ok(())
    }

    fn replay_text<H: DocumentHost + ?Sized>(
        &self,
        host: &mut H,
        tx: &mut Transaction,
        direction: ReplayDirection,
    ) -> LiveditResult<()> {
        let node = resolve(&*host, &source(tx, direction).locator, "element")?;
        let text = side_mut(tx, direction).text.clone().unwrap_or_default();
        host.set_text_content(node, &text)?;
        refresh(&*host, node, side_mut(tx, direction), self.locator_config());
        Ok(())
    }

    fn replay_class<H: DocumentHost + ?Sized>(
        &self,
        host: &mut H,
        tx: &mut Transaction,
        direction: ReplayDirection,
    ) -> LiveditResult<()> {
        let node = resolve(&*host, &source(tx, direction).locator, "element")?;
        let classes = side_mut(tx, direction).classes.clone().unwrap_or_default();
        host.set_class_list(node, &classes)?;
        refresh(&*host, node, side_mut(tx, direction), self.locator_config());
        Ok(())
    }

    fn replay_move<H: DocumentHost + ?Sized>(
        &self,
        host: &mut H,
        tx: &mut Transaction,
        direction: ReplayDirection,
    ) -> LiveditResult<()> {
        let TxKind::Move(data) = &tx.kind else {
            return Err(LiveditError::invalid_target(format!(
                "transaction {} is not a move",
                tx.id
            )));
        };
        let destination = match direction {
            ReplayDirection::Undo => &data.from,
            ReplayDirection::Redo => &data.to,
        };
        let node = resolve(&*host, &source(tx, direction).locator, "element")?;
        let (parent, reference) = resolve_insertion(&*host, destination, Some(node))?;
        check_container(&*host, parent, "move")?;
        host.insert_before(parent, node, reference)?;

        let config = self.locator_config();
        let landed = insertion_point_of(&*host, node, config);
        if let (Ok(point), TxKind::Move(data)) = (landed, &mut tx.kind) {
            match direction {
                ReplayDirection::Undo => data.from = point,
                ReplayDirection::Redo => data.to = point,
            }
        }
        refresh(&*host, node, side_mut(tx, direction), config);
        Ok(())
    }
}

/// Snapshot whose locator finds the element before a step: `after` on
/// undo, `before` on redo
fn source(tx: &Transaction, direction: ReplayDirection) -> &super::Snapshot {
    match direction {
        ReplayDirection::Undo => &tx.after,
        ReplayDirection::Redo => &tx.before,
    }
}
