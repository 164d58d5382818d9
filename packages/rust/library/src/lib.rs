//! Board library store.
//!
//! [`BoardLibrary`] wraps the persisted `library.json`: all known boards in
//! insertion order plus the single active-board pointer.
//!
//! **Access rules:**
//! - The store is the sole writer of its backing file.
//! - Every write goes through write-temp-then-rename, so an interrupted
//!   write can never leave a partial file. Concurrent writers degrade to
//!   last-writer-wins at file-replace granularity.

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::Utc;
use tracing::{debug, info};
use url::Url;

use youmind_shared::{
    BoardId, BoardRecord, BoardTarget, Library, Result, YoumindError,
};

// ---------------------------------------------------------------------------
// Inputs / outputs
// ---------------------------------------------------------------------------

/// Caller-supplied fields for a new board record.
#[derive(Debug, Clone)]
pub struct NewBoard {
    pub url: String,
    pub name: String,
    pub description: String,
    pub topics: Vec<String>,
}

/// Policy flags for [`BoardLibrary::add`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AddOptions {
    /// Skip the duplicate-URL guard.
    pub allow_duplicate_url: bool,
    /// Make the new record active even when it is not the first.
    pub activate: bool,
}

/// Derived, read-only library counts.
#[derive(Debug, Clone)]
pub struct LibraryStats {
    pub boards: usize,
    pub distinct_topics: usize,
    pub active_name: Option<String>,
    pub most_recently_used: Option<String>,
}

// ---------------------------------------------------------------------------
// BoardLibrary
// ---------------------------------------------------------------------------

/// The persistent board library and its operations.
pub struct BoardLibrary {
    path: PathBuf,
    library: Library,
}

impl BoardLibrary {
    /// Open the library at `path`, creating an empty one if no file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let library = if path.exists() {
            let content =
                std::fs::read_to_string(&path).map_err(|e| YoumindError::io(&path, e))?;
            serde_json::from_str(&content).map_err(|e| {
                YoumindError::storage(format!("corrupt library at {}: {e}", path.display()))
            })?
        } else {
            debug!(path = %path.display(), "no library file, starting empty");
            Library::default()
        };

        Ok(Self { path, library })
    }

    /// Persist the library via write-temp-then-rename.
    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| YoumindError::io(parent, e))?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(&self.library)
            .map_err(|e| YoumindError::storage(format!("serialize library: {e}")))?;
        std::fs::write(&temp_path, content).map_err(|e| YoumindError::io(&temp_path, e))?;
        std::fs::rename(&temp_path, &self.path).map_err(|e| YoumindError::io(&self.path, e))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // CRUD
    // -----------------------------------------------------------------------

    /// Add a board. Fails with [`YoumindError::DuplicateUrl`] when the URL is
    /// already present and the guard is not overridden. The first record (or
    /// an explicit request) becomes active.
    pub fn add(&mut self, board: NewBoard, opts: AddOptions) -> Result<BoardRecord> {
        if !opts.allow_duplicate_url
            && self.library.boards.iter().any(|b| b.url == board.url)
        {
            return Err(YoumindError::DuplicateUrl { url: board.url });
        }

        let record = BoardRecord {
            id: BoardId::new(),
            url: board.url,
            name: board.name,
            description: board.description,
            topics: board.topics,
            created_at: Utc::now(),
            last_used_at: None,
        };

        let make_active = opts.activate || self.library.boards.is_empty();
        if make_active {
            self.library.active_id = Some(record.id);
        }

        self.library.boards.push(record.clone());
        self.save()?;

        info!(id = %record.id, name = %record.name, active = make_active, "board added");
        Ok(record)
    }

    /// All boards in insertion order. Restartable — call as often as needed.
    pub fn list(&self) -> impl Iterator<Item = &BoardRecord> {
        self.library.boards.iter()
    }

    /// Look up a board by id.
    pub fn get(&self, id: BoardId) -> Option<&BoardRecord> {
        self.library.boards.iter().find(|b| b.id == id)
    }

    /// The active board, if the pointer is set.
    pub fn get_active(&self) -> Option<&BoardRecord> {
        self.library.active_id.and_then(|id| self.get(id))
    }

    /// Case-insensitive substring search across name, description, and
    /// topics. Exact name matches rank first, then name substrings, then
    /// description/topic matches; ties keep insertion order.
    pub fn search(&self, query: &str) -> Vec<&BoardRecord> {
        let needle = query.to_lowercase();

        let mut matches: Vec<(u8, usize, &BoardRecord)> = self
            .library
            .boards
            .iter()
            .enumerate()
            .filter_map(|(idx, board)| {
                let name = board.name.to_lowercase();
                let rank = if name == needle {
                    0
                } else if name.contains(&needle) {
                    1
                } else if board.description.to_lowercase().contains(&needle)
                    || board
                        .topics
                        .iter()
                        .any(|t| t.to_lowercase().contains(&needle))
                {
                    2
                } else {
                    return None;
                };
                Some((rank, idx, board))
            })
            .collect();

        matches.sort_by_key(|(rank, idx, _)| (*rank, *idx));
        matches.into_iter().map(|(_, _, board)| board).collect()
    }

    /// Move the active pointer to `id`. Exactly one record is active after a
    /// successful call; repeating it is a no-op.
    pub fn activate(&mut self, id: BoardId) -> Result<()> {
        if self.get(id).is_none() {
            return Err(YoumindError::not_found(id.to_string()));
        }
        self.library.active_id = Some(id);
        self.save()?;
        info!(%id, "board activated");
        Ok(())
    }

    /// Remove a board. If it was active, the pointer becomes unset — it is
    /// never reassigned automatically.
    pub fn remove(&mut self, id: BoardId) -> Result<BoardRecord> {
        let position = self
            .library
            .boards
            .iter()
            .position(|b| b.id == id)
            .ok_or_else(|| YoumindError::not_found(id.to_string()))?;

        let removed = self.library.boards.remove(position);
        if self.library.active_id == Some(id) {
            self.library.active_id = None;
        }
        self.save()?;

        info!(%id, name = %removed.name, "board removed");
        Ok(removed)
    }

    /// Record that a board was just used as a query target.
    pub fn touch(&mut self, id: BoardId) -> Result<()> {
        let board = self
            .library
            .boards
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| YoumindError::not_found(id.to_string()))?;

        board.last_used_at = Some(Utc::now());
        self.save()
    }

    /// Derived counts; read-only.
    pub fn stats(&self) -> LibraryStats {
        let mut topics: HashSet<String> = HashSet::new();
        for board in &self.library.boards {
            for topic in &board.topics {
                topics.insert(topic.to_lowercase());
            }
        }

        let most_recently_used = self
            .library
            .boards
            .iter()
            .filter(|b| b.last_used_at.is_some())
            .max_by_key(|b| b.last_used_at)
            .map(|b| b.name.clone());

        LibraryStats {
            boards: self.library.boards.len(),
            distinct_topics: topics.len(),
            active_name: self.get_active().map(|b| b.name.clone()),
            most_recently_used,
        }
    }

    // -----------------------------------------------------------------------
    // Target resolution
    // -----------------------------------------------------------------------

    /// Resolve a caller's board reference to a concrete chat URL.
    pub fn resolve_target(&self, target: &BoardTarget) -> Result<ResolvedTarget> {
        match target {
            BoardTarget::Url(url) => Ok(ResolvedTarget {
                url: url.clone(),
                record_id: None,
            }),
            BoardTarget::Id(id) => {
                let board = self
                    .get(*id)
                    .ok_or_else(|| YoumindError::not_found(id.to_string()))?;
                Ok(ResolvedTarget {
                    url: parse_board_url(board)?,
                    record_id: Some(board.id),
                })
            }
            BoardTarget::Active => {
                let board = self.get_active().ok_or_else(|| {
                    YoumindError::validation(
                        "no active board set — activate one or pass --board-id/--board-url",
                    )
                })?;
                Ok(ResolvedTarget {
                    url: parse_board_url(board)?,
                    record_id: Some(board.id),
                })
            }
        }
    }
}

/// A resolved query target: the URL to drive, plus the library record it
/// came from (for `last_used_at` bookkeeping), when there is one.
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    pub url: Url,
    pub record_id: Option<BoardId>,
}

fn parse_board_url(board: &BoardRecord) -> Result<Url> {
    Url::parse(&board.url).map_err(|e| {
        YoumindError::storage(format!("board {} has invalid URL {}: {e}", board.id, board.url))
    })
}
