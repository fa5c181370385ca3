// 📚 Library Index - saved boards, public and private
//
// The whole library is one JSON array under `tierlist_all_tiers`. Every
// change is a read-modify-write of that array through `Store::update_json`,
// so a thumbnail patch can't race a save or delete.
//
// Saving is two-phase:
//   1. the entry is written immediately with an empty thumbnail
//   2. a best-effort step renders the board and patches the thumbnail by id
// Phase 2 can fail without affecting phase 1.

use crate::board::Board;
use crate::error::{Result, StorageError, TierError};
use crate::identity::random_base36;
use crate::protocol::{self, EditorState, RowDocument};
use crate::render::{render_image, ImageLoader, Rasterizer, RenderedBoard};
use crate::storage::{Store, KEY_LIBRARY};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// VISIBILITY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = TierError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            other => Err(TierError::Validation(format!(
                "unknown visibility '{}' (expected public or private)",
                other
            ))),
        }
    }
}

// ============================================================================
// LIBRARY ENTRY
// ============================================================================

/// Saved board snapshot + metadata. Never modified after save, except for
/// the thumbnail patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub author_id: String,
    #[serde(default)]
    pub is_public: bool,
    /// Data URI, empty until phase 2 lands
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub rows: Vec<RowDocument>,
    #[serde(default)]
    pub type_labels: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl LibraryEntry {
    pub fn visibility(&self) -> Visibility {
        if self.is_public {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }

    /// Only these entries are shown to `viewer_id` under `visibility`
    pub fn is_visible(&self, visibility: Visibility, viewer_id: &str) -> bool {
        match visibility {
            Visibility::Public => self.is_public,
            Visibility::Private => !self.is_public && self.author_id == viewer_id,
        }
    }

    /// Editable board from this snapshot (grades kept)
    pub fn to_board(&self) -> Board {
        protocol::restore_editor_state(&EditorState {
            name: self.name.clone(),
            rows: self.rows.clone(),
            type_labels: self.type_labels.clone(),
        })
    }

    /// Read-only rendering (leading empty cells trimmed, author credit)
    pub fn read_only_view(&self) -> RenderedBoard {
        let author = if self.author.is_empty() { crate::identity::ANONYMOUS } else { self.author.as_str() };
        RenderedBoard::read_only(&self.name, &self.type_labels, &self.rows, Some(author))
    }

    pub fn has_thumbnail(&self) -> bool {
        !self.thumbnail.is_empty()
    }
}

/// `tier_<unix millis>_<6 random base36 chars>`
pub fn generate_entry_id(now: DateTime<Utc>) -> String {
    format!("tier_{}_{}", now.timestamp_millis(), random_base36(6))
}

/// Everything needed to save the current board
#[derive(Debug, Clone)]
pub struct NewEntry<'a> {
    pub board: &'a Board,
    pub name: &'a str,
    pub is_public: bool,
    pub author: &'a str,
    pub author_id: &'a str,
}

/// What `LibraryIndex::delete` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// No entry with that id (already gone)
    Missing,
    /// Private entry owned by someone else; left in place
    NotOwner,
}

impl DeleteOutcome {
    pub fn is_deleted(&self) -> bool {
        matches!(self, DeleteOutcome::Deleted)
    }
}

// ============================================================================
// LIBRARY INDEX
// ============================================================================

#[derive(Debug, Clone)]
pub struct LibraryIndex {
    store: Store,
}

impl LibraryIndex {
    pub fn new(store: Store) -> Self {
        LibraryIndex { store }
    }

    /// All entries; unreadable or corrupt storage reads as empty
    pub fn entries(&self) -> Vec<LibraryEntry> {
        self.store.read_json(KEY_LIBRARY).unwrap_or_default()
    }

    fn update<R>(&self, apply: impl FnOnce(&mut Vec<LibraryEntry>) -> (R, bool)) -> Option<R> {
        self.store.update_json(KEY_LIBRARY, apply)
    }

    /// Entries `viewer_id` may see under the given tab
    pub fn list(&self, visibility: Visibility, viewer_id: &str) -> Vec<LibraryEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.is_visible(visibility, viewer_id))
            .collect()
    }

    /// Missing ids are not an error
    pub fn get(&self, id: &str) -> Option<LibraryEntry> {
        self.entries().into_iter().find(|e| e.id == id)
    }

    /// Phase 1: persist a new entry (no thumbnail) and return it
    pub fn create(&self, new: NewEntry<'_>) -> Result<LibraryEntry> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(TierError::Validation("a saved board needs a name".to_string()));
        }

        let snapshot = protocol::editor_state(new.board);
        let entry = self
            .update(|entries| {
                let now = Utc::now();
                let mut id = generate_entry_id(now);
                while entries.iter().any(|e| e.id == id) {
                    id = generate_entry_id(now);
                }

                let entry = LibraryEntry {
                    id,
                    name: name.to_string(),
                    author: new.author.to_string(),
                    author_id: new.author_id.to_string(),
                    is_public: new.is_public,
                    thumbnail: String::new(),
                    rows: snapshot.rows,
                    type_labels: snapshot.type_labels,
                    created_at: now,
                };
                entries.push(entry.clone());
                (entry, true)
            })
            .ok_or(TierError::Storage(StorageError::Poisoned))?;

        tracing::info!(id = %entry.id, name = %entry.name, visibility = %entry.visibility(), "saved board to library");
        Ok(entry)
    }

    /// Phase 2: patch the thumbnail of an existing entry. Best-effort:
    /// an unknown id is logged and reported as `false`.
    pub fn attach_thumbnail(&self, id: &str, thumbnail: &str) -> bool {
        let patched = self.update(|entries| match entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.thumbnail = thumbnail.to_string();
                (true, true)
            }
            None => (false, false),
        });

        if patched != Some(true) {
            tracing::warn!(id, "thumbnail ready but entry is gone; dropping it");
            return false;
        }
        true
    }

    /// Render and attach a thumbnail; failures never propagate
    pub fn generate_thumbnail(
        &self,
        entry: &LibraryEntry,
        loader: &dyn ImageLoader,
        rasterizer: &dyn Rasterizer,
    ) -> bool {
        let view = RenderedBoard::from_board(&entry.to_board());
        match render_image(&view, loader, rasterizer) {
            Ok(image) => self.attach_thumbnail(&entry.id, &image.to_data_uri()),
            Err(e) => {
                tracing::warn!(id = %entry.id, error = %e, "thumbnail generation failed; entry saved without one");
                false
            }
        }
    }

    /// Both phases back to back (CLI path). The returned entry is the phase-1
    /// value; the stored one may carry a thumbnail.
    pub fn save_with_thumbnail(
        &self,
        new: NewEntry<'_>,
        loader: &dyn ImageLoader,
        rasterizer: &dyn Rasterizer,
    ) -> Result<LibraryEntry> {
        let entry = self.create(new)?;
        self.generate_thumbnail(&entry, loader, rasterizer);
        Ok(entry)
    }

    /// Remove an entry on behalf of `viewer_id`. Idempotent. A private
    /// entry can only be removed by its author.
    pub fn delete(&self, id: &str, viewer_id: &str) -> DeleteOutcome {
        let outcome = self
            .update(|entries| match entries.iter().position(|e| e.id == id) {
                None => (DeleteOutcome::Missing, false),
                Some(pos) if !entries[pos].is_public && entries[pos].author_id != viewer_id => {
                    (DeleteOutcome::NotOwner, false)
                }
                Some(pos) => {
                    entries.remove(pos);
                    (DeleteOutcome::Deleted, true)
                }
            })
            .unwrap_or(DeleteOutcome::Missing);

        match outcome {
            DeleteOutcome::Deleted => tracing::info!(id, "deleted library entry"),
            DeleteOutcome::Missing => tracing::debug!(id, "delete: no such entry"),
            DeleteOutcome::NotOwner => {
                tracing::warn!(id, viewer_id, "refusing to delete another author's private entry")
            }
        }
        outcome
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{Cell, Row};
    use crate::render::{DataUriLoader, RasterImage, SvgRasterizer};
    use anyhow::bail;

    struct BrokenRasterizer;

    impl Rasterizer for BrokenRasterizer {
        fn rasterize(&self, _board: &RenderedBoard) -> anyhow::Result<RasterImage> {
            bail!("canvas unavailable")
        }
    }

    fn index() -> LibraryIndex {
        LibraryIndex::new(Store::open_in_memory().unwrap())
    }

    fn board() -> Board {
        let mut board = Board::new("Heroes");
        board.labels = vec!["Atk".to_string(), "Def".to_string()];
        board.rows.push(Row::from_parts("Knight", None, vec![Cell::empty(), Cell::with_item("S")]));
        board
    }

    fn new_entry<'a>(board: &'a Board, name: &'a str, is_public: bool, author_id: &'a str) -> NewEntry<'a> {
        NewEntry {
            board,
            name,
            is_public,
            author: "Ana",
            author_id,
        }
    }

    #[test]
    fn test_entry_id_format() {
        let id = generate_entry_id(Utc::now());
        let parts: Vec<&str> = id.split('_').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "tier");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 6);
    }

    #[test]
    fn test_create_persists_snapshot() {
        let library = index();
        let b = board();

        let entry = library.create(new_entry(&b, "  My list ", true, "user_a")).unwrap();

        assert_eq!(entry.name, "My list");
        assert!(!entry.has_thumbnail());
        assert_eq!(entry.type_labels, vec!["Atk", "Def"]);
        assert_eq!(entry.rows[0].cells, vec![None, Some("S".to_string())]);
        assert_eq!(library.get(&entry.id), Some(entry));
    }

    #[test]
    fn test_create_requires_name() {
        let library = index();
        let b = board();

        assert!(matches!(
            library.create(new_entry(&b, "   ", true, "user_a")),
            Err(TierError::Validation(_))
        ));
        assert!(library.entries().is_empty());
    }

    #[test]
    fn test_ids_are_unique() {
        let library = index();
        let b = board();

        for i in 0..20 {
            library.create(new_entry(&b, &format!("n{}", i), true, "u")).unwrap();
        }

        let mut ids: Vec<String> = library.entries().into_iter().map(|e| e.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 20);
    }

    #[test]
    fn test_visibility_filtering() {
        let library = index();
        let b = board();

        let private_u = library.create(new_entry(&b, "private", false, "U")).unwrap();
        let public_v = library.create(new_entry(&b, "public", true, "V")).unwrap();

        let private_for_u = library.list(Visibility::Private, "U");
        assert_eq!(private_for_u, vec![private_u.clone()]);

        assert!(library.list(Visibility::Private, "V").is_empty());

        for viewer in ["U", "V", "W"] {
            let public = library.list(Visibility::Public, viewer);
            assert_eq!(public, vec![public_v.clone()]);
        }
    }

    #[test]
    fn test_delete_is_idempotent() {
        let library = index();
        let b = board();
        let entry = library.create(new_entry(&b, "gone", true, "U")).unwrap();

        assert_eq!(library.delete(&entry.id, "U"), DeleteOutcome::Deleted);
        assert_eq!(library.delete(&entry.id, "U"), DeleteOutcome::Missing);
        assert_eq!(library.delete("tier_does_not_exist", "U"), DeleteOutcome::Missing);
        assert_eq!(library.get(&entry.id), None);
    }

    #[test]
    fn test_private_entry_only_deleted_by_author() {
        let library = index();
        let b = board();
        let private = library.create(new_entry(&b, "mine", false, "U")).unwrap();
        let public = library.create(new_entry(&b, "ours", true, "U")).unwrap();

        assert_eq!(library.delete(&private.id, "V"), DeleteOutcome::NotOwner);
        assert_eq!(library.get(&private.id), Some(private.clone()));

        assert!(library.delete(&public.id, "V").is_deleted());
        assert!(library.delete(&private.id, "U").is_deleted());
        assert!(library.entries().is_empty());
    }

    #[test]
    fn test_thumbnail_patches_do_not_drop_concurrent_saves() {
        let library = index();
        let b = board();
        let first = library.create(new_entry(&b, "first", true, "U")).unwrap();

        let patcher = library.clone();
        let first_id = first.id.clone();
        let handle = std::thread::spawn(move || {
            for _ in 0..500 {
                patcher.attach_thumbnail(&first_id, "data:image/png;base64,AAAA");
            }
        });

        let mut created = vec![first.id];
        for i in 0..100 {
            let entry = library.create(new_entry(&b, &format!("n{}", i), true, "U")).unwrap();
            created.push(entry.id);
        }
        handle.join().unwrap();

        let stored = library.entries();
        assert_eq!(stored.len(), created.len());
        for id in &created {
            assert!(stored.iter().any(|e| &e.id == id), "lost entry {}", id);
        }
        assert!(library.get(&created[0]).unwrap().has_thumbnail());
    }

    #[test]
    fn test_thumbnail_is_patched_after_save() {
        let library = index();
        let b = board();

        let entry = library
            .save_with_thumbnail(new_entry(&b, "thumb", true, "U"), &DataUriLoader, &SvgRasterizer::default())
            .unwrap();

        assert!(!entry.has_thumbnail());
        let stored = library.get(&entry.id).unwrap();
        assert!(stored.thumbnail.starts_with("data:image/svg+xml;base64,"));
    }

    #[test]
    fn test_thumbnail_failure_keeps_entry() {
        let library = index();
        let b = board();

        let entry = library
            .save_with_thumbnail(new_entry(&b, "no thumb", false, "U"), &DataUriLoader, &BrokenRasterizer)
            .unwrap();

        let stored = library.get(&entry.id).unwrap();
        assert!(!stored.has_thumbnail());
        assert_eq!(library.list(Visibility::Private, "U").len(), 1);
    }

    #[test]
    fn test_thumbnail_for_deleted_entry_is_dropped() {
        let library = index();
        let b = board();
        let entry = library.create(new_entry(&b, "x", true, "U")).unwrap();
        library.delete(&entry.id, "U");

        assert!(!library.attach_thumbnail(&entry.id, "data:image/png;base64,AAAA"));
        assert!(library.entries().is_empty());
    }

    #[test]
    fn test_reads_entries_saved_by_the_browser() {
        let store = Store::open_in_memory().unwrap();
        store
            .set(
                KEY_LIBRARY,
                r#"[{
                    "id": "tier_1700000000000abcde",
                    "name": "Old",
                    "author": "Anônimo",
                    "authorId": "user_abc123xyz",
                    "isPublic": false,
                    "thumbnail": "",
                    "rows": [{ "title": "r", "img": "", "cells": [null, "A"] }],
                    "typeLabels": ["x", "y"],
                    "createdAt": "2024-05-01T12:00:00.000Z"
                }]"#,
            )
            .unwrap();
        let library = LibraryIndex::new(store);

        let entry = library.get("tier_1700000000000abcde").unwrap();
        assert_eq!(entry.visibility(), Visibility::Private);
        assert_eq!(library.list(Visibility::Private, "user_abc123xyz").len(), 1);

        let view = entry.read_only_view();
        assert_eq!(view.rows[0].cells, vec![Some("A".to_string())]);
        assert_eq!(view.credit.as_deref(), Some("Created by: Anônimo"));
    }

    #[test]
    fn test_corrupt_library_reads_as_empty() {
        let store = Store::open_in_memory().unwrap();
        store.set(KEY_LIBRARY, "[{ broken").unwrap();

        let library = LibraryIndex::new(store);
        assert!(library.entries().is_empty());
        assert_eq!(library.get("anything"), None);
    }

    #[test]
    fn test_entry_to_board_keeps_grades() {
        let library = index();
        let b = board();
        let entry = library.create(new_entry(&b, "n", true, "U")).unwrap();

        let restored = entry.to_board();

        assert_eq!(restored.title, "n");
        assert_eq!(restored.rows[0].score(), Some(4.0));
    }

    #[test]
    fn test_visibility_from_str() {
        assert_eq!("Public".parse::<Visibility>().unwrap(), Visibility::Public);
        assert_eq!(" private ".parse::<Visibility>().unwrap(), Visibility::Private);
        assert!("everyone".parse::<Visibility>().is_err());
    }
}
