use crate::error::{MacroError, Result};
use crate::events::{Anchor, EventStore, MacroEvent};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Saves and loads macros as JSON files in a directory.
///
/// The persisted format is a pretty-printed array of event objects.
/// Template anchor pixel data never goes into the JSON: patches are written
/// as PNG files under `templates/` and referenced by path, and read back in
/// on load.
pub struct MacroStorage {
    dir: PathBuf,
}

impl MacroStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        fs::create_dir_all(dir.join("templates"))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist a macro under a sanitized, timestamped file name and return
    /// the path written
    pub fn save(&self, store: &EventStore, label: &str) -> Result<PathBuf> {
        let mut store = store.clone();
        self.externalize_templates(&mut store)?;

        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let filename = format!("{}_{}.json", sanitize(label), timestamp);
        let path = self.dir.join(filename);

        let json = serde_json::to_string_pretty(&store)?;
        fs::write(&path, json)?;
        info!("Saved macro with {} events to {:?}", store.len(), path);
        Ok(path)
    }

    /// Load a macro, skipping malformed events and re-reading template
    /// patches from disk
    pub fn load(&self, path: impl AsRef<Path>) -> Result<EventStore> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)?;
        let raw: Vec<serde_json::Value> = serde_json::from_str(&json)?;

        let mut store = EventStore::new();
        for (index, value) in raw.into_iter().enumerate() {
            match serde_json::from_value::<MacroEvent>(value) {
                Ok(event) => store.push(event),
                Err(e) => {
                    warn!("Skipping malformed event {} in {:?}: {}", index, path, e);
                }
            }
        }
        self.rehydrate_templates(&mut store);
        info!("Loaded macro with {} events from {:?}", store.len(), path);
        Ok(store)
    }

    /// All saved macro files, newest name last
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
            .collect();
        paths.sort();
        Ok(paths)
    }

    pub fn delete(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::remove_file(path.as_ref())?;
        Ok(())
    }

    /// Write in-memory template patches out as PNG files and point their
    /// anchors at the files
    fn externalize_templates(&self, store: &mut EventStore) -> Result<()> {
        let millis = chrono::Utc::now().timestamp_millis();
        for (index, event) in store.events.iter_mut().enumerate() {
            let anchor = match event {
                MacroEvent::Click { anchor, .. } | MacroEvent::Drag { anchor, .. } => anchor,
                _ => continue,
            };
            if let Some(Anchor::Template { path, image, .. }) = anchor {
                if path.is_none() {
                    let Some(pixels) = image.as_ref() else {
                        continue;
                    };
                    let file = self
                        .dir
                        .join("templates")
                        .join(format!("tmpl_{}_{}.png", millis, index));
                    pixels.save(&file).map_err(|e| {
                        MacroError::StorageError(format!(
                            "Could not write template {:?}: {}",
                            file, e
                        ))
                    })?;
                    *path = Some(file);
                }
            }
        }
        Ok(())
    }

    /// Read template patch files back into memory where they still exist
    fn rehydrate_templates(&self, store: &mut EventStore) {
        for event in store.events.iter_mut() {
            let anchor = match event {
                MacroEvent::Click { anchor, .. } | MacroEvent::Drag { anchor, .. } => anchor,
                _ => continue,
            };
            if let Some(Anchor::Template { path, image, .. }) = anchor {
                if image.is_none() {
                    if let Some(p) = path {
                        match image::open(&*p) {
                            Ok(img) => *image = Some(img.to_rgba8()),
                            Err(e) => warn!("Could not read template {:?}: {}", p, e),
                        }
                    }
                }
            }
        }
    }
}

fn sanitize(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "macro".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{DragSample, MouseButton, Position};
    use image::RgbaImage;

    fn sample_store() -> EventStore {
        let mut store = EventStore::new();
        store.push(MacroEvent::Click {
            pos: Position::new(10, 20),
            button: MouseButton::Left,
            anchor: Some(Anchor::Color { rgb: (1, 2, 3) }),
            timestamp: 100.0,
            delay: 0.0,
        });
        store.push(MacroEvent::Drag {
            start: Position::new(10, 20),
            end: Position::new(60, 20),
            button: MouseButton::Left,
            anchor: Some(Anchor::Template {
                path: None,
                origin: Position::new(10, 20),
                image: Some(RgbaImage::from_pixel(8, 8, image::Rgba([9, 9, 9, 255]))),
            }),
            timestamp: 101.0,
            delay: 1.0,
            duration: 0.4,
            samples: vec![
                DragSample { dx: 0, dy: 0, dt: 0.0 },
                DragSample { dx: 50, dy: 0, dt: 0.4 },
            ],
        });
        store.push(MacroEvent::KeyPress {
            key: "a".to_string(),
            timestamp: 102.0,
            delay: 0.6,
        });
        store
    }

    #[test]
    fn save_and_load_round_trips_events() {
        let dir = tempfile::tempdir().unwrap();
        let storage = MacroStorage::new(dir.path()).unwrap();
        let store = sample_store();

        let path = storage.save(&store, "my test macro!").unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("my_test_macro_"));

        let loaded = storage.load(&path).unwrap();
        assert_eq!(loaded.len(), store.len());
        assert_eq!(loaded.events[0], store.events[0]);
        assert_eq!(loaded.events[2], store.events[2]);

        // The drag's template went to disk and came back with its pixels.
        match &loaded.events[1] {
            MacroEvent::Drag {
                anchor: Some(Anchor::Template { path, image, origin }),
                samples,
                ..
            } => {
                assert!(path.as_ref().unwrap().exists());
                assert_eq!(image.as_ref().unwrap().dimensions(), (8, 8));
                assert_eq!(*origin, Position::new(10, 20));
                assert_eq!(samples.len(), 2);
            }
            other => panic!("expected template drag, got {:?}", other),
        }
    }

    #[test]
    fn template_pixels_never_land_in_the_json() {
        let dir = tempfile::tempdir().unwrap();
        let storage = MacroStorage::new(dir.path()).unwrap();
        let path = storage.save(&sample_store(), "macro").unwrap();
        let json = fs::read_to_string(&path).unwrap();
        assert!(json.contains("\"kind\""));
        assert!(!json.contains("image"));
    }

    #[test]
    fn malformed_events_are_skipped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let storage = MacroStorage::new(dir.path()).unwrap();
        let path = dir.path().join("broken.json");
        fs::write(
            &path,
            r#"[
                {"type": "key_press", "key": "a", "timestamp": 1.0, "delay": 0.0},
                {"type": "click", "button": "left"},
                {"garbage": true}
            ]"#,
        )
        .unwrap();

        let loaded = storage.load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(matches!(loaded.events[0], MacroEvent::KeyPress { .. }));
    }

    #[test]
    fn list_and_delete_manage_saved_macros() {
        let dir = tempfile::tempdir().unwrap();
        let storage = MacroStorage::new(dir.path()).unwrap();
        let path = storage.save(&sample_store(), "one").unwrap();
        assert_eq!(storage.list().unwrap().len(), 1);
        storage.delete(&path).unwrap();
        assert!(storage.list().unwrap().is_empty());
    }
}
