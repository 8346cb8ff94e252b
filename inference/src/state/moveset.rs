//! Shared-constraint moveset tracking
//!
//! An opponent's moveset is a mix of revealed moves and a constraint set of
//! moves the remaining unknown slots could hold. Movesets become linked when
//! one copies another (Transform, switch-in overlays over a base set): a move
//! revealed on any member of a link group is revealed on all of them, and
//! they share one constraint set.
//!
//! Movesets live in a central [`MovesetArena`] and are addressed by
//! [`MovesetId`]; links are arena-level group ids rather than references
//! between records, so severing a link (switch-out) is just moving a record
//! into a fresh group, and stale links cannot survive.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::dex::{Dex, MoveData};
use crate::error::{InferenceError, Result};

pub const MAX_MOVES: usize = 4;

/// PP cap for moves copied by Transform.
const TRANSFORM_PP: u32 = 5;

/// Handle to a moveset record in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MovesetId(u32);

/// A revealed move with PP bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub name: String,
    pub pp: u32,
    pub max_pp: u32,
}

impl Move {
    pub fn new(data: &MoveData) -> Self {
        Move {
            name: data.name.clone(),
            pp: data.max_pp,
            max_pp: data.max_pp,
        }
    }

    fn capped(data: &MoveData, cap: u32) -> Self {
        let pp = data.max_pp.min(cap);
        Move {
            name: data.name.clone(),
            pp,
            max_pp: pp,
        }
    }

    pub fn deduct(&mut self, amount: u32) {
        self.pp = self.pp.saturating_sub(amount);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MovesetRecord {
    moves: BTreeMap<String, Move>,
    size: usize,
    group: u32,
    base: Option<MovesetId>,
    /// Transform copies get their PP capped.
    transformed: bool,
}

/// Central store for all movesets in a battle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MovesetArena {
    records: Vec<MovesetRecord>,
    /// Shared constraint per link group: moves the unknown slots could be.
    groups: BTreeMap<u32, BTreeSet<String>>,
    next_group: u32,
    free: Vec<u32>,
}

impl MovesetArena {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_group(&mut self) -> u32 {
        let g = self.next_group;
        self.next_group += 1;
        g
    }

    fn idx(&self, id: MovesetId) -> usize {
        id.0 as usize
    }

    fn members(&self, group: u32) -> Vec<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.group == group)
            .map(|(i, _)| i)
            .collect()
    }

    fn alloc_record(&mut self, record: MovesetRecord) -> MovesetId {
        if let Some(slot) = self.free.pop() {
            self.records[slot as usize] = record;
            MovesetId(slot)
        } else {
            self.records.push(record);
            MovesetId(self.records.len() as u32 - 1)
        }
    }

    /// Allocate a moveset whose slots could hold anything in `movepool`.
    ///
    /// If the pool is no larger than the slot count, every move is revealed
    /// immediately.
    pub fn alloc(&mut self, movepool: &[String], size: usize, dex: &Dex) -> Result<MovesetId> {
        let size = size.clamp(1, MAX_MOVES);
        let group = self.fresh_group();

        let mut moves = BTreeMap::new();
        let mut constraint = BTreeSet::new();
        if movepool.len() <= size {
            for name in movepool {
                moves.insert(name.clone(), Move::new(dex.move_data(name)?));
            }
        } else {
            constraint = movepool.iter().cloned().collect();
        }

        self.groups.insert(group, constraint);
        Ok(self.alloc_record(MovesetRecord {
            moves,
            size,
            group,
            base: None,
            transformed: false,
        }))
    }

    /// Allocate an overlay that starts as a copy of `base` and joins its
    /// link group, so reveals propagate both ways.
    pub fn alloc_overlay(&mut self, base: MovesetId) -> MovesetId {
        let src = &self.records[self.idx(base)];
        let record = MovesetRecord {
            moves: src.moves.clone(),
            size: src.size,
            group: src.group,
            base: Some(base),
            transformed: false,
        };
        self.alloc_record(record)
    }

    /// Sever `id` from its link group and return it to the free list.
    pub fn release(&mut self, id: MovesetId) -> Result<()> {
        self.isolate(id)?;
        let i = self.idx(id);
        let group = self.records[i].group;
        self.groups.remove(&group);
        self.free.push(id.0);
        Ok(())
    }

    pub fn moves(&self, id: MovesetId) -> &BTreeMap<String, Move> {
        &self.records[self.idx(id)].moves
    }

    pub fn constraint(&self, id: MovesetId) -> &BTreeSet<String> {
        &self.groups[&self.records[self.idx(id)].group]
    }

    pub fn size(&self, id: MovesetId) -> usize {
        self.records[self.idx(id)].size
    }

    pub fn contains(&self, id: MovesetId, name: &str) -> bool {
        self.records[self.idx(id)].moves.contains_key(name)
    }

    /// Whether every slot is accounted for.
    pub fn is_complete(&self, id: MovesetId) -> bool {
        let r = &self.records[self.idx(id)];
        r.moves.len() >= r.size
    }

    /// Grow the slot count. Shrinking is a tracking error: a slot once
    /// observed cannot un-exist.
    pub fn set_size(&mut self, id: MovesetId, size: usize) -> Result<()> {
        let i = self.idx(id);
        let current = self.records[i].size;
        if size < current {
            return Err(InferenceError::MovesetShrink {
                current,
                requested: size,
            });
        }
        let size = size.min(MAX_MOVES);
        for m in self.members(self.records[i].group) {
            self.records[m].size = size;
        }
        self.check_constraints(id, None)
    }

    fn known(&self, id: MovesetId) -> String {
        self.records[self.idx(id)]
            .moves
            .keys()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn insert_move(&mut self, i: usize, data: &MoveData) {
        let rec = &mut self.records[i];
        if rec.moves.contains_key(&data.name) || rec.moves.len() >= rec.size {
            return;
        }
        let mv = if rec.transformed {
            Move::capped(data, TRANSFORM_PP)
        } else {
            Move::new(data)
        };
        rec.moves.insert(data.name.clone(), mv);
    }

    /// Reveal `name` on `id` and every linked moveset, then re-check the
    /// shared constraint. Revealing an already-known move is a no-op.
    pub fn reveal(&mut self, id: MovesetId, name: &str, dex: &Dex) -> Result<()> {
        let i = self.idx(id);
        if self.records[i].moves.contains_key(name) {
            return Ok(());
        }
        if self.records[i].moves.len() >= self.records[i].size {
            return Err(InferenceError::MovesetFull {
                known: self.known(id),
            });
        }
        let data = dex.move_data(name)?.clone();
        tracing::debug!(moveset = id.0, move_name = name, "revealed move");

        let group = self.records[i].group;
        for m in self.members(group) {
            self.insert_move(m, &data);
        }
        self.infer_doesnt_have(id, &[name], dex)
    }

    /// Record that the unknown slots of `id`'s link group cannot hold any of
    /// `names`, then auto-reveal if the constraint collapsed.
    pub fn infer_doesnt_have(&mut self, id: MovesetId, names: &[&str], dex: &Dex) -> Result<()> {
        let group = self.records[self.idx(id)].group;
        if let Some(constraint) = self.groups.get_mut(&group) {
            for name in names {
                constraint.remove(*name);
            }
        }
        self.check_constraints(id, Some(dex))
    }

    /// Collapse rule: when the constraint has no more candidates than there
    /// are unknown slots, every candidate must be one of those slots.
    fn check_constraints(&mut self, id: MovesetId, dex: Option<&Dex>) -> Result<()> {
        let i = self.idx(id);
        let rec = &self.records[i];
        let group = rec.group;
        let remaining = rec.size.saturating_sub(rec.moves.len());

        if remaining == 0 {
            if let Some(constraint) = self.groups.get_mut(&group) {
                constraint.clear();
            }
            return Ok(());
        }

        let constraint = self.groups.get(&group).cloned().unwrap_or_default();
        if constraint.is_empty() || constraint.len() > remaining {
            return Ok(());
        }
        let Some(dex) = dex else {
            return Ok(());
        };

        tracing::debug!(moveset = id.0, count = constraint.len(), "constraint collapsed, revealing rest");
        for name in &constraint {
            let data = dex.move_data(name)?.clone();
            for m in self.members(group) {
                self.insert_move(m, &data);
            }
        }
        if let Some(c) = self.groups.get_mut(&group) {
            c.clear();
        }
        Ok(())
    }

    /// Deduct PP for a use of `name`, revealing it first if needed.
    ///
    /// An untransformed overlay mirrors its base record, so the deduction
    /// lands on both and spent PP survives the overlay's release on switch.
    /// A Transform copy keeps its own capped PP and leaves the base alone.
    pub fn use_move(&mut self, id: MovesetId, name: &str, pp: u32, dex: &Dex) -> Result<()> {
        self.reveal(id, name, dex)?;
        let i = self.idx(id);
        if let Some(mv) = self.records[i].moves.get_mut(name) {
            mv.deduct(pp);
        }
        if !self.records[i].transformed
            && let Some(base) = self.records[i].base
        {
            let b = self.idx(base);
            if let Some(mv) = self.records[b].moves.get_mut(name) {
                mv.deduct(pp);
            }
        }
        Ok(())
    }

    /// Replace a known move with another (Mimic, Sketch). Applies to this
    /// record only unless `permanent`, in which case the base record (the
    /// real moveset under an overlay) changes too.
    pub fn replace(
        &mut self,
        id: MovesetId,
        old: &str,
        new: &str,
        dex: &Dex,
        permanent: bool,
    ) -> Result<()> {
        let i = self.idx(id);
        if !self.records[i].moves.contains_key(old) {
            return Err(InferenceError::ReplaceAbsent(old.to_string()));
        }
        if self.records[i].moves.contains_key(new) {
            return Err(InferenceError::DuplicateMove(new.to_string()));
        }
        let data = dex.move_data(new)?.clone();

        let mut targets = vec![i];
        if permanent && let Some(base) = self.records[i].base {
            targets.push(self.idx(base));
        }
        for t in targets {
            self.records[t].moves.remove(old);
            let mv = if self.records[t].transformed {
                Move::capped(&data, TRANSFORM_PP)
            } else {
                Move::new(&data)
            };
            self.records[t].moves.insert(new.to_string(), mv);
        }
        self.infer_doesnt_have(id, &[new], dex)
    }

    /// Link `user` to `target` as a Transform copy: the user's moves become
    /// PP-capped copies of the target's known moves and both share one
    /// constraint from now on.
    pub fn link_transform(&mut self, user: MovesetId, target: MovesetId, dex: &Dex) -> Result<()> {
        let ti = self.idx(target);
        let target_group = self.records[ti].group;
        let target_size = self.records[ti].size;
        let names: Vec<String> = self.records[ti].moves.keys().cloned().collect();

        let ui = self.idx(user);
        let old_group = self.records[ui].group;
        self.records[ui].transformed = true;
        self.records[ui].size = target_size;
        self.records[ui].moves.clear();
        for name in &names {
            let data = dex.move_data(name)?.clone();
            self.insert_move(ui, &data);
        }
        self.records[ui].group = target_group;
        if self.members(old_group).is_empty() {
            self.groups.remove(&old_group);
        }
        Ok(())
    }

    /// Sever `id` from its link group, giving it a private copy of the
    /// current constraint.
    pub fn isolate(&mut self, id: MovesetId) -> Result<()> {
        let i = self.idx(id);
        let old_group = self.records[i].group;
        let constraint = self.groups.get(&old_group).cloned().unwrap_or_default();

        let group = self.fresh_group();
        self.groups.insert(group, constraint);
        self.records[i].group = group;
        self.records[i].base = None;
        self.records[i].transformed = false;

        if self.members(old_group).is_empty() {
            self.groups.remove(&old_group);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::sample_dex;

    fn pool(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_small_pool_reveals_immediately() {
        let dex = sample_dex();
        let mut arena = MovesetArena::new();
        let id = arena.alloc(&pool(&["Transform"]), 4, &dex).unwrap();
        assert!(arena.contains(id, "Transform"));
        assert!(arena.constraint(id).is_empty());
    }

    #[test]
    fn test_reveal_narrows_constraint() {
        let dex = sample_dex();
        let mut arena = MovesetArena::new();
        let id = arena
            .alloc(
                &pool(&["Surf", "Sludge Bomb", "Toxic", "Protect", "Giga Drain"]),
                4,
                &dex,
            )
            .unwrap();
        assert_eq!(arena.constraint(id).len(), 5);

        arena.reveal(id, "Surf", &dex).unwrap();
        assert!(arena.contains(id, "Surf"));
        assert!(!arena.constraint(id).contains("Surf"));
        assert_eq!(arena.constraint(id).len(), 4);
    }

    #[test]
    fn test_constraint_collapse_auto_reveals() {
        let dex = sample_dex();
        let mut arena = MovesetArena::new();
        let id = arena
            .alloc(
                &pool(&["Surf", "Sludge Bomb", "Toxic", "Protect", "Giga Drain"]),
                4,
                &dex,
            )
            .unwrap();

        // one reveal leaves 3 unknown slots and 4 candidates: no collapse
        arena.reveal(id, "Surf", &dex).unwrap();
        assert_eq!(arena.moves(id).len(), 1);

        // ruling out one candidate leaves 3 candidates for 3 slots: collapse
        arena.infer_doesnt_have(id, &["Giga Drain"], &dex).unwrap();
        assert_eq!(arena.moves(id).len(), 4);
        assert!(arena.contains(id, "Toxic"));
        assert!(arena.constraint(id).is_empty());
        assert!(arena.is_complete(id));
    }

    #[test]
    fn test_reveal_past_capacity_errors() {
        let dex = sample_dex();
        let mut arena = MovesetArena::new();
        let id = arena
            .alloc(
                &pool(&["Earthquake", "Ice Beam", "Thunderbolt", "Flamethrower", "Surf", "Protect"]),
                2,
                &dex,
            )
            .unwrap();
        arena.reveal(id, "Earthquake", &dex).unwrap();
        arena.reveal(id, "Ice Beam", &dex).unwrap();

        let err = arena.reveal(id, "Surf", &dex).unwrap_err();
        assert!(matches!(err, InferenceError::MovesetFull { .. }));

        // re-revealing a known move stays fine
        arena.reveal(id, "Ice Beam", &dex).unwrap();
    }

    #[test]
    fn test_overlay_shares_reveals_both_ways() {
        let dex = sample_dex();
        let mut arena = MovesetArena::new();
        let base = arena
            .alloc(
                &pool(&["Surf", "Sludge Bomb", "Toxic", "Protect", "Giga Drain"]),
                4,
                &dex,
            )
            .unwrap();
        let overlay = arena.alloc_overlay(base);

        arena.reveal(overlay, "Toxic", &dex).unwrap();
        assert!(arena.contains(base, "Toxic"));

        arena.reveal(base, "Surf", &dex).unwrap();
        assert!(arena.contains(overlay, "Surf"));
    }

    #[test]
    fn test_isolate_severs_link() {
        let dex = sample_dex();
        let mut arena = MovesetArena::new();
        let base = arena
            .alloc(
                &pool(&["Surf", "Sludge Bomb", "Toxic", "Protect", "Giga Drain"]),
                4,
                &dex,
            )
            .unwrap();
        let overlay = arena.alloc_overlay(base);
        arena.isolate(overlay).unwrap();

        arena.reveal(overlay, "Toxic", &dex).unwrap();
        assert!(!arena.contains(base, "Toxic"));
    }

    #[test]
    fn test_transform_copies_with_pp_cap() {
        let dex = sample_dex();
        let mut arena = MovesetArena::new();
        let target = arena
            .alloc(
                &pool(&["Surf", "Sludge Bomb", "Toxic", "Protect", "Giga Drain"]),
                4,
                &dex,
            )
            .unwrap();
        arena.reveal(target, "Surf", &dex).unwrap();

        let user = arena.alloc(&pool(&["Transform"]), 4, &dex).unwrap();
        arena.link_transform(user, target, &dex).unwrap();

        let copied = &arena.moves(user)["Surf"];
        assert_eq!(copied.pp, 5);

        // reveals on the target now propagate to the transformed copy
        arena.reveal(target, "Toxic", &dex).unwrap();
        assert!(arena.contains(user, "Toxic"));
        assert_eq!(arena.moves(user)["Toxic"].pp, 5);
    }

    #[test]
    fn test_replace_mimic_and_permanence() {
        let dex = sample_dex();
        let mut arena = MovesetArena::new();
        let base = arena
            .alloc(&pool(&["Mimic", "Psychic", "Protect", "Rest"]), 4, &dex)
            .unwrap();
        let overlay = arena.alloc_overlay(base);

        // temporary replacement touches only the overlay
        arena
            .replace(overlay, "Mimic", "Thunderbolt", &dex, false)
            .unwrap();
        assert!(arena.contains(overlay, "Thunderbolt"));
        assert!(arena.contains(base, "Mimic"));

        assert!(matches!(
            arena.replace(overlay, "Splash", "Surf", &dex, false),
            Err(InferenceError::ReplaceAbsent(_))
        ));
        assert!(matches!(
            arena.replace(overlay, "Psychic", "Thunderbolt", &dex, false),
            Err(InferenceError::DuplicateMove(_))
        ));
    }

    #[test]
    fn test_use_move_reveals_and_deducts() {
        let dex = sample_dex();
        let mut arena = MovesetArena::new();
        let id = arena
            .alloc(
                &pool(&["Surf", "Sludge Bomb", "Toxic", "Protect", "Giga Drain"]),
                4,
                &dex,
            )
            .unwrap();
        arena.use_move(id, "Surf", 1, &dex).unwrap();
        assert_eq!(arena.moves(id)["Surf"].pp, 14);
    }

    #[test]
    fn test_overlay_use_deducts_base_pp() {
        let dex = sample_dex();
        let mut arena = MovesetArena::new();
        let id = arena
            .alloc(
                &pool(&["Surf", "Sludge Bomb", "Toxic", "Protect", "Giga Drain"]),
                4,
                &dex,
            )
            .unwrap();
        let overlay = arena.alloc_overlay(id);
        arena.use_move(overlay, "Toxic", 1, &dex).unwrap();
        assert_eq!(arena.moves(overlay)["Toxic"].pp, 9);
        // spent PP outlives the overlay
        arena.release(overlay).unwrap();
        assert_eq!(arena.moves(id)["Toxic"].pp, 9);
    }

    #[test]
    fn test_set_size_cannot_shrink() {
        let dex = sample_dex();
        let mut arena = MovesetArena::new();
        let id = arena
            .alloc(
                &pool(&["Surf", "Sludge Bomb", "Toxic", "Protect", "Giga Drain"]),
                2,
                &dex,
            )
            .unwrap();
        arena.set_size(id, 4).unwrap();
        assert!(matches!(
            arena.set_size(id, 3),
            Err(InferenceError::MovesetShrink { .. })
        ));
    }
}
