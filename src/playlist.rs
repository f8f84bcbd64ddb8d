//! Playlist model.
//!
//! An ordered list of URIs with a signed cursor: the position may go
//! negative (before-begin) or reach the list size (past-end), which is how
//! end-of-play is detected when looping is off. The list is partitioned at
//! construction into runs of identical file extensions ("sub-playlists");
//! the manager tier plays one run at a time so a single pipeline can be
//! reused across consecutive items of the same encoding.

use log::{debug, trace};
use rand::{rngs::StdRng, RngExt, SeedableRng};

use crate::probe::uri_extension;

/// Direction of sub-playlist traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListDirection {
    Up,
    Down,
}

/// Ordered URI list with navigation, loop and shuffle semantics.
#[derive(Debug, Clone)]
pub struct Playlist {
    uris: Vec<String>,
    position: i64,
    loop_playback: bool,
    shuffle: bool,
    /// Run boundaries: starts at 0, ends at `len()`. A single-format list
    /// has exactly one run.
    sub_list_positions: Vec<usize>,
    current_sub_list: i64,
    single_format: bool,
}

impl Playlist {
    /// Builds a playlist; when `shuffle` is set the URI order is permuted
    /// exactly once, here.
    pub fn new(mut uris: Vec<String>, shuffle: bool) -> Playlist {
        if shuffle {
            shuffle_uris(&mut uris);
        }
        let mut playlist = Playlist {
            uris,
            position: 0,
            loop_playback: false,
            shuffle,
            sub_list_positions: Vec::new(),
            current_sub_list: -1,
            single_format: false,
        };
        playlist.scan_list();
        playlist
    }

    fn from_slice(uris: &[String]) -> Playlist {
        let mut playlist = Playlist {
            uris: uris.to_vec(),
            position: 0,
            loop_playback: false,
            shuffle: false,
            sub_list_positions: Vec::new(),
            current_sub_list: -1,
            single_format: false,
        };
        playlist.scan_list();
        playlist
    }

    pub fn len(&self) -> usize {
        self.uris.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uris.is_empty()
    }

    pub fn uris(&self) -> &[String] {
        &self.uris
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn loop_playback(&self) -> bool {
        self.loop_playback
    }

    pub fn set_loop_playback(&mut self, loop_playback: bool) {
        self.loop_playback = loop_playback;
    }

    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    pub fn before_begin(&self) -> bool {
        self.position < 0
    }

    pub fn past_end(&self) -> bool {
        self.position >= self.uris.len() as i64
    }

    pub fn single_format(&self) -> bool {
        self.single_format
    }

    /// The URI under the cursor. The cursor must be inside the list; use
    /// [`Playlist::before_begin`] / [`Playlist::past_end`] first.
    pub fn current_uri(&self) -> &str {
        assert!(
            self.position >= 0 && self.position < self.uris.len() as i64,
            "current_uri called with cursor at {} (size {})",
            self.position,
            self.uris.len()
        );
        &self.uris[self.position as usize]
    }

    /// Moves the cursor by `jump`. With looping on, wraps modulo the list
    /// size (negative positions wrap to `size - |position|`); with looping
    /// off the cursor is allowed to leave the list.
    pub fn skip(&mut self, jump: i64) {
        let size = self.uris.len() as i64;
        self.position += jump;
        if self.loop_playback && size > 0 {
            if self.position < 0 {
                self.position = size - self.position.abs();
            } else if self.position >= size {
                self.position %= size;
            }
        }
        trace!(
            "skip: jump {} new position {} of {}",
            jump,
            self.position,
            size
        );
    }

    /// Places the cursor, wrapping with the same rule as [`Playlist::skip`].
    pub fn set_position(&mut self, position: i64) {
        if self.uris.is_empty() {
            return;
        }
        let size = self.uris.len() as i64;
        let mut capped = position;
        if capped >= size {
            capped %= size;
        } else if capped < 0 {
            capped = size - capped.abs();
        }
        trace!("set_position: {} -> {}", position, capped);
        self.position = capped;
    }

    /// Removes the URI at `position` (used when probing finds an unplayable
    /// item). Run boundaries are rebuilt so they keep spanning `0..len()`.
    pub fn erase_uri(&mut self, position: i64) {
        let size = self.uris.len() as i64;
        if position < 0 || position >= size {
            return;
        }
        self.uris.remove(position as usize);
        self.scan_list();
        let sub_lists = self.sub_list_count() as i64;
        if self.current_sub_list >= sub_lists {
            self.current_sub_list = sub_lists - 1;
        }
    }

    /// Number of extension runs in the list.
    pub fn sub_list_count(&self) -> usize {
        self.sub_list_positions.len().saturating_sub(1)
    }

    /// Whether another sub-playlist exists in `direction` without wrapping
    /// around the list.
    pub fn has_next_sub_playlist(&self, direction: ListDirection) -> bool {
        if self.uris.is_empty() || self.single_format {
            return false;
        }
        match direction {
            ListDirection::Up => self.current_sub_list + 1 < self.sub_list_count() as i64,
            ListDirection::Down => self.current_sub_list > 0,
        }
    }

    /// Advances (or retreats) the sub-playlist cursor and returns a copy of
    /// that run, wrapping at either end. An empty or single-format list is
    /// returned whole. The returned list's cursor sits at the run's first
    /// entry going up, at its last entry going down.
    pub fn obtain_next_sub_playlist(&mut self, direction: ListDirection) -> Playlist {
        if self.uris.is_empty() || self.single_format {
            let mut sub = Playlist::from_slice(&self.uris);
            if direction == ListDirection::Down && !sub.is_empty() {
                sub.position = sub.len() as i64 - 1;
            }
            return sub;
        }

        let sub_lists = self.sub_list_count() as i64;
        match direction {
            ListDirection::Up => {
                self.current_sub_list += 1;
                if self.current_sub_list >= sub_lists {
                    self.current_sub_list = 0;
                }
            }
            ListDirection::Down => {
                if self.current_sub_list <= 0 {
                    self.current_sub_list = sub_lists;
                }
                self.current_sub_list -= 1;
            }
        }

        let first = self.sub_list_positions[self.current_sub_list as usize];
        let last = self.sub_list_positions[self.current_sub_list as usize + 1];
        debug!(
            "sub-playlist {} spans [{}, {})",
            self.current_sub_list, first, last
        );

        let mut sub = Playlist::from_slice(&self.uris[first..last]);
        if direction == ListDirection::Down {
            sub.position = sub.len() as i64 - 1;
        }
        self.position = first as i64;
        sub
    }

    fn scan_list(&mut self) {
        self.sub_list_positions.clear();
        self.single_format = false;
        if self.uris.is_empty() {
            return;
        }
        let mut current_extension = String::new();
        for (position, uri) in self.uris.iter().enumerate() {
            let extension = uri_extension(uri);
            if position == 0 || extension != current_extension {
                self.sub_list_positions.push(position);
                current_extension = extension;
            }
        }
        self.sub_list_positions.push(self.uris.len());
        self.single_format = self.sub_list_count() == 1;
    }
}

fn shuffle_uris(uris: &mut [String]) {
    let mut seed = [0u8; 32];
    getrandom::fill(&mut seed).expect("Failed to generate random seed");
    let mut rng = StdRng::from_seed(seed);
    for i in (1..uris.len()).rev() {
        let j = rng.random_range(0..=i);
        uris.swap(i, j);
    }
}
