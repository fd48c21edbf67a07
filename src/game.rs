//! The contract between a device and the game plugged into it.
//!
//! A [`Game`] is anything with metadata and two hooks. The device never calls the hooks
//! directly: it wraps the game in a [`Cartridge`], which guarantees that `on_init` runs
//! before the first `on_step`, even if nobody initialized the cartridge explicitly.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::report_violation;
use crate::telemetry::{ViolationKind, ViolationSeverity};
use crate::Device;

/// Derived identifier of a game: `"game-"` followed by the lowercased title, with every
/// run of whitespace collapsed into one hyphen.
///
/// Two games with titles that differ only in case or spacing share an id.
///
/// ```
/// use handheld_link::GameId;
///
/// assert_eq!(GameId::from_title("Super  Mario Land").as_str(), "game-super-mario-land");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(String);

impl GameId {
    /// Derives the id for `title`.
    #[must_use]
    pub fn from_title(title: &str) -> Self {
        let mut id = String::with_capacity(title.len() + 5);
        id.push_str("game-");
        let mut in_whitespace = false;
        for c in title.chars() {
            if c.is_whitespace() {
                if !in_whitespace {
                    id.push('-');
                }
                in_whitespace = true;
            } else {
                id.extend(c.to_lowercase());
                in_whitespace = false;
            }
        }
        Self(id)
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for GameId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Descriptive data every game carries. The [`GameId`] is derived once from the title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameMetadata {
    id: GameId,
    title: String,
    description: String,
    player_description: String,
    developer_description: String,
}

impl GameMetadata {
    /// Creates metadata and derives the id from `title`.
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        player_description: impl Into<String>,
        developer_description: impl Into<String>,
    ) -> Self {
        let title = title.into();
        Self {
            id: GameId::from_title(&title),
            title,
            description: description.into(),
            player_description: player_description.into(),
            developer_description: developer_description.into(),
        }
    }

    /// The derived id.
    #[must_use]
    pub fn id(&self) -> &GameId {
        &self.id
    }

    /// Display title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Short description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// How to play.
    #[must_use]
    pub fn player_description(&self) -> &str {
        &self.player_description
    }

    /// Notes for people extending the game.
    #[must_use]
    pub fn developer_description(&self) -> &str {
        &self.developer_description
    }
}

/// A game that can be plugged into a [`Device`].
///
/// Both hooks receive the device the game is running on, so a game can read buttons,
/// draw through [`Device::with_surface`] and exchange messages with peers.
///
/// Hooks run while the device's game slot is locked. A game must not call
/// [`Device::load_game`] or [`Device::turn_on`] on the device it runs on; everything
/// else (including [`Device::turn_off`]) is fine.
///
/// # Example
///
/// ```
/// use handheld_link::{Device, Game, GameMetadata};
///
/// struct Blinker {
///     metadata: GameMetadata,
///     frames: u64,
/// }
///
/// impl Game for Blinker {
///     fn metadata(&self) -> &GameMetadata {
///         &self.metadata
///     }
///
///     fn on_init(&mut self, _device: &Device) {
///         self.frames = 0;
///     }
///
///     fn on_step(&mut self, _device: &Device) {
///         self.frames += 1;
///     }
/// }
/// ```
pub trait Game: Send {
    /// Title, descriptions and derived id.
    fn metadata(&self) -> &GameMetadata;

    /// Called once before the first step, and again whenever the device is powered on.
    fn on_init(&mut self, device: &Device);

    /// Called once per tick while the device is on.
    fn on_step(&mut self, device: &Device);
}

impl<G: Game + ?Sized> Game for Box<G> {
    fn metadata(&self) -> &GameMetadata {
        (**self).metadata()
    }

    fn on_init(&mut self, device: &Device) {
        (**self).on_init(device);
    }

    fn on_step(&mut self, device: &Device) {
        (**self).on_step(device);
    }
}

/// Lifecycle wrapper around a loaded game.
///
/// `init` marks the cartridge initialized before calling `on_init`, so a hook that
/// steps the cartridge again cannot trigger a second initialization. `step` initializes
/// lazily when needed and then always calls `on_step`. Panics in hooks propagate.
pub struct Cartridge {
    game: Box<dyn Game>,
    initialized: bool,
}

impl fmt::Debug for Cartridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cartridge")
            .field("id", self.id())
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}

impl Cartridge {
    /// Wraps `game`. The cartridge starts uninitialized.
    #[must_use]
    pub fn new<G: Game + 'static>(game: G) -> Self {
        Self {
            game: Box::new(game),
            initialized: false,
        }
    }

    /// Marks the cartridge initialized and runs the game's `on_init` hook.
    pub fn init(&mut self, device: &Device) {
        self.initialized = true;
        debug!(game = %self.id(), device = %device.id(), "Initializing game");
        self.game.on_init(device);
    }

    /// Runs one tick: `init` first if that has not happened yet, then `on_step`.
    pub fn step(&mut self, device: &Device) {
        if !self.initialized {
            self.init(device);
        }
        self.game.on_step(device);
    }

    /// Whether `init` has run.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// The game's metadata.
    #[must_use]
    pub fn metadata(&self) -> &GameMetadata {
        self.game.metadata()
    }

    /// The game's derived id.
    #[must_use]
    pub fn id(&self) -> &GameId {
        self.game.metadata().id()
    }

    /// Unwraps the game.
    #[must_use]
    pub fn into_inner(self) -> Box<dyn Game> {
        self.game
    }
}

type GameFactory = Box<dyn Fn() -> Box<dyn Game> + Send + Sync>;

struct LibraryEntry {
    metadata: GameMetadata,
    factory: GameFactory,
}

/// A catalog of game factories keyed by [`GameId`].
///
/// Registering a second factory under an id that is already taken replaces the first
/// one; the collision is reported as a registry warning.
///
/// ```
/// use handheld_link::{Device, Game, GameLibrary, GameMetadata};
///
/// struct Idle(GameMetadata);
///
/// impl Game for Idle {
///     fn metadata(&self) -> &GameMetadata { &self.0 }
///     fn on_init(&mut self, _device: &Device) {}
///     fn on_step(&mut self, _device: &Device) {}
/// }
///
/// let mut library = GameLibrary::new();
/// library.register(|| Idle(GameMetadata::new("Idle Game", "", "", "")));
///
/// let id = library.ids().next().unwrap().clone();
/// assert_eq!(id.as_str(), "game-idle-game");
/// assert!(library.create(&id).is_some());
/// ```
#[derive(Default)]
pub struct GameLibrary {
    entries: BTreeMap<GameId, LibraryEntry>,
}

impl fmt::Debug for GameLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameLibrary")
            .field("games", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl GameLibrary {
    /// Creates an empty library.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory`, reading the id from one instance it builds.
    ///
    /// Returns the metadata of the entry that was replaced, if any.
    pub fn register<F, G>(&mut self, factory: F) -> Option<GameMetadata>
    where
        F: Fn() -> G + Send + Sync + 'static,
        G: Game + 'static,
    {
        let metadata = factory().metadata().clone();
        let id = metadata.id().clone();
        let factory: GameFactory = Box::new(move || -> Box<dyn Game> { Box::new(factory()) });

        let replaced = self
            .entries
            .insert(id.clone(), LibraryEntry { metadata, factory })
            .map(|entry| entry.metadata);
        if let Some(previous) = &replaced {
            report_violation!(
                ViolationSeverity::Warning,
                ViolationKind::Registry,
                "Game '{}' replaced '{}' under id {}",
                self.entries
                    .get(&id)
                    .map_or("", |entry| entry.metadata.title()),
                previous.title(),
                id
            );
        } else {
            debug!(game = %id, "Registered game");
        }
        replaced
    }

    /// Builds a fresh instance of the game registered under `id`.
    #[must_use]
    pub fn create(&self, id: &GameId) -> Option<Box<dyn Game>> {
        self.entries.get(id).map(|entry| (entry.factory)())
    }

    /// Metadata of the game registered under `id`.
    #[must_use]
    pub fn get(&self, id: &GameId) -> Option<&GameMetadata> {
        self.entries.get(id).map(|entry| &entry.metadata)
    }

    /// Registered ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = &GameId> + '_ {
        self.entries.keys()
    }

    /// Metadata of every registered game, ordered by id.
    pub fn metadata(&self) -> impl Iterator<Item = &GameMetadata> + '_ {
        self.entries.values().map(|entry| &entry.metadata)
    }

    /// Whether a game is registered under `id`.
    #[must_use]
    pub fn contains(&self, id: &GameId) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of registered games.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
