//! Process-wide fallback font registry.
//!
//! One registry is created at startup and shared (`Arc`) by every
//! [`crate::font::Font`]. Discovery is lazy: nothing is opened until the
//! first glyph misses a primary face. Bundled fonts (shipped with the
//! application, e.g. CJK/symbol coverage) are opened first, then a short
//! fixed list of well-known system font paths is probed; resolution walks
//! the faces in exactly that order, first match wins.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};

use crate::raster::{Face, RasterBackend};
use crate::{Result, TextError};

/// Candidate system font paths probed during discovery, most useful first.
/// Only paths that exist are opened; everything else is skipped silently.
#[cfg(target_os = "macos")]
const SYSTEM_FONT_PATHS: &[&str] = &[
    "/System/Library/Fonts/SFNS.ttf",
    "/System/Library/Fonts/Helvetica.ttc",
    "/System/Library/Fonts/Apple Symbols.ttf",
    "/System/Library/Fonts/Menlo.ttc",
    "/Library/Fonts/Arial Unicode.ttf",
];

#[cfg(target_os = "windows")]
const SYSTEM_FONT_PATHS: &[&str] = &[
    "C:\\Windows\\Fonts\\segoeui.ttf",
    "C:\\Windows\\Fonts\\seguisym.ttf",
    "C:\\Windows\\Fonts\\msgothic.ttc",
    "C:\\Windows\\Fonts\\msyh.ttc",
    "C:\\Windows\\Fonts\\arial.ttf",
];

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const SYSTEM_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/noto/NotoSans-Regular.ttf",
    "/usr/share/fonts/truetype/noto/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
];

/// Where a fallback face's bytes come from.
#[derive(Clone)]
pub enum FontSource {
    /// A font file on disk.
    File(PathBuf),
    /// Font bytes embedded in or handed over by the application.
    Memory(Arc<Vec<u8>>),
}

impl fmt::Debug for FontSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Memory(data) => write!(f, "<{} bytes in memory>", data.len()),
        }
    }
}

/// One opened fallback face.
///
/// The face handle is shared by every font instance in the process, and its
/// character size is mutable face state, so all use goes through the mutex;
/// callers re-apply their size under the lock immediately before
/// rasterizing.
pub(crate) struct FallbackFace {
    pub(crate) source: FontSource,
    pub(crate) is_system_font: bool,
    pub(crate) face: Mutex<Box<dyn Face>>,
}

/// Ordered fallback face chain, initialized once per process.
pub struct FallbackRegistry {
    backend: Arc<dyn RasterBackend>,
    bundled: Vec<FontSource>,
    system_candidates: Vec<PathBuf>,
    faces: OnceLock<Vec<FallbackFace>>,
}

impl FallbackRegistry {
    /// Create an uninitialized registry. `bundled` fonts are tried before
    /// any discovered system font, in the given order.
    pub fn new(backend: Arc<dyn RasterBackend>, bundled: Vec<FontSource>) -> Arc<Self> {
        Self::with_system_candidates(
            backend,
            bundled,
            SYSTEM_FONT_PATHS.iter().map(PathBuf::from).collect(),
        )
    }

    /// Like [`Self::new`] with an explicit probe list; an empty list
    /// disables system font discovery entirely.
    pub fn with_system_candidates(
        backend: Arc<dyn RasterBackend>,
        bundled: Vec<FontSource>,
        system_candidates: Vec<PathBuf>,
    ) -> Arc<Self> {
        Arc::new(Self {
            backend,
            bundled,
            system_candidates,
            faces: OnceLock::new(),
        })
    }

    /// Faces in resolution order. The first call performs discovery;
    /// concurrent first calls block until the winner finishes, so the
    /// expensive open/probe work happens exactly once.
    pub(crate) fn faces(&self) -> &[FallbackFace] {
        self.faces.get_or_init(|| self.discover())
    }

    fn discover(&self) -> Vec<FallbackFace> {
        let mut faces = Vec::new();

        for source in &self.bundled {
            match self.open(source) {
                Ok(face) => faces.push(FallbackFace {
                    source: source.clone(),
                    is_system_font: false,
                    face: Mutex::new(face),
                }),
                Err(err) => {
                    tracing::warn!("skipping bundled fallback font {:?}: {}", source, err);
                }
            }
        }

        for path in &self.system_candidates {
            if !path.exists() {
                continue;
            }
            let source = FontSource::File(path.clone());
            match self.open(&source) {
                Ok(face) => faces.push(FallbackFace {
                    source,
                    is_system_font: true,
                    face: Mutex::new(face),
                }),
                Err(err) => {
                    tracing::warn!("skipping system font {}: {}", path.display(), err);
                }
            }
        }

        let system = faces.iter().filter(|f| f.is_system_font).count();
        tracing::debug!(
            "fallback registry initialized: {} faces ({} bundled, {} system)",
            faces.len(),
            faces.len() - system,
            system
        );
        faces
    }

    fn open(&self, source: &FontSource) -> Result<Box<dyn Face>> {
        let data = match source {
            FontSource::File(path) => Arc::new(std::fs::read(path).map_err(|e| {
                TextError::FaceLoad(format!("{}: {}", path.display(), e))
            })?),
            FontSource::Memory(data) => Arc::clone(data),
        };
        self.backend.open_face(data)
    }

    /// Whether discovery has run. Useful for asserting laziness; resolution
    /// never needs to check this.
    pub fn is_initialized(&self) -> bool {
        self.faces.get().is_some()
    }

    /// Number of opened fallback faces. Triggers discovery.
    pub fn face_count(&self) -> usize {
        self.faces().len()
    }
}

impl fmt::Debug for FallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackRegistry")
            .field("initialized", &self.is_initialized())
            .field("faces", &self.faces.get().map_or(0, Vec::len))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{coverage_font, MockBackend};

    fn temp_font_file(name: &str, contents: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("nib_text_{}_{}", std::process::id(), name));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn discovery_is_lazy_and_ordered() {
        let backend = MockBackend::shared();
        let system_path = temp_font_file("ordered.font", &coverage_font("XYZ"));
        let registry = FallbackRegistry::with_system_candidates(
            backend,
            vec![
                FontSource::Memory(Arc::new(coverage_font("ABC"))),
                FontSource::Memory(Arc::new(coverage_font("DEF"))),
            ],
            vec![system_path.clone()],
        );

        assert!(!registry.is_initialized());
        let faces = registry.faces();
        assert!(registry.is_initialized());

        assert_eq!(faces.len(), 3);
        assert!(!faces[0].is_system_font);
        assert!(!faces[1].is_system_font);
        assert!(faces[2].is_system_font);
        assert_eq!(faces[0].face.lock().unwrap().glyph_index('A'), 'A' as u32);
        assert_eq!(faces[1].face.lock().unwrap().glyph_index('D'), 'D' as u32);
        assert_eq!(faces[2].face.lock().unwrap().glyph_index('X'), 'X' as u32);

        std::fs::remove_file(system_path).ok();
    }

    #[test]
    fn unopenable_sources_are_skipped() {
        let backend = MockBackend::shared();
        let registry = FallbackRegistry::with_system_candidates(
            backend,
            vec![
                FontSource::Memory(Arc::new(Vec::new())), // rejected by the backend
                FontSource::Memory(Arc::new(coverage_font("ABC"))),
            ],
            vec![PathBuf::from("/nonexistent/nib_text/font.ttf")],
        );

        assert_eq!(registry.face_count(), 1);
    }

    #[test]
    fn concurrent_first_use_initializes_once() {
        let backend = MockBackend::shared();
        let registry = FallbackRegistry::with_system_candidates(
            backend.clone(),
            vec![FontSource::Memory(Arc::new(coverage_font("ABC")))],
            Vec::new(),
        );

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let registry = Arc::clone(&registry);
                scope.spawn(move || registry.face_count());
            }
        });

        assert_eq!(registry.face_count(), 1);
        assert_eq!(backend.faces_opened(), 1);
    }
}
