use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context as _, Result};
use tracing::{debug, info, warn};

use crate::config::AUDIO_EXTENSIONS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundEntry {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub name: String,
    pub sounds: Vec<SoundEntry>,
}

/// Position of a sound inside the catalog, as encoded into button IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoundRef {
    pub category: usize,
    pub sound: usize,
}

/// Read-only table of every playable sound, grouped by category.
///
/// Categories and the sounds within them are sorted, so indexes are stable for the lifetime of
/// the process and can be handed out as [`SoundRef`]s.
#[derive(Debug, Clone, Default)]
pub struct SoundCatalog {
    categories: Vec<Category>,
}

impl SoundCatalog {
    /// Build the catalog from a directory where every subdirectory is a category
    pub fn scan(root: &Path) -> Result<Self> {
        let mut categories = Vec::new();

        let entries = fs::read_dir(root)
            .with_context(|| format!("Failed to read sound directory {}", root.display()))?;

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                warn!("Skipping category with non UTF-8 name: {}", path.display());
                continue;
            };
            if !path.is_dir() || is_hidden(&name) {
                continue;
            }

            let sounds = scan_category(&path)?;
            if sounds.is_empty() {
                debug!("Skipping empty category '{name}'");
                continue;
            }

            categories.push(Category { name, sounds });
        }

        categories.sort_by(|a, b| a.name.cmp(&b.name));

        info!(
            "Loaded {} sounds across {} categories from {}",
            categories.iter().map(|c| c.sounds.len()).sum::<usize>(),
            categories.len(),
            root.display(),
        );

        Ok(Self { categories })
    }

    #[cfg(test)]
    pub fn from_categories(mut categories: Vec<Category>) -> Self {
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        for category in &mut categories {
            category.sounds.sort_by(|a, b| a.name.cmp(&b.name));
        }
        Self { categories }
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn category(&self, index: usize) -> Option<&Category> {
        self.categories.get(index)
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn get(&self, sound_ref: SoundRef) -> Option<&SoundEntry> {
        self.categories
            .get(sound_ref.category)?
            .sounds
            .get(sound_ref.sound)
    }

    pub fn find(&self, category: &str, sound: &str) -> Option<SoundRef> {
        let category_index = self.categories.iter().position(|c| c.name == category)?;
        let sound_index = self.categories[category_index]
            .sounds
            .binary_search_by(|s| s.name.as_str().cmp(sound))
            .ok()?;

        Some(SoundRef {
            category: category_index,
            sound: sound_index,
        })
    }
}

fn scan_category(dir: &Path) -> Result<Vec<SoundEntry>> {
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)
        .with_context(|| format!("Failed to read category directory {}", dir.display()))?
    {
        let path = entry?.path();
        if path.is_file() && is_audio_file(&path) {
            files.push(path);
        }
    }

    // sorting by full file name first makes the winner of a stem collision deterministic
    files.sort();

    let mut sounds: Vec<SoundEntry> = Vec::with_capacity(files.len());
    for path in files {
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if sounds.iter().any(|s| s.name == name) {
            warn!(
                "Duplicate sound name '{name}' in {}, ignoring {}",
                dir.display(),
                path.display()
            );
            continue;
        }
        sounds.push(SoundEntry {
            name: name.to_string(),
            path,
        });
    }

    sounds.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(sounds)
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

fn is_audio_file(path: &Path) -> bool {
    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    // NTFS alternate data streams copied over from Windows show up as `x.mp3:Zone.Identifier`
    if is_hidden(file_name) || file_name.contains("Zone.Identifier") {
        return false;
    }

    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            AUDIO_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, relative: &str) {
        let path = dir.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn scan_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        touch(root, "memes/zeta.mp3");
        touch(root, "memes/alpha.WAV");
        touch(root, "memes/.hidden.mp3");
        touch(root, "memes/notes.txt");
        touch(root, "memes/beta.ogg:Zone.Identifier");
        touch(root, "anime/yamete.m4a");
        touch(root, ".git/ignored.mp3");
        touch(root, "loose.mp3");
        fs::create_dir_all(root.join("empty")).unwrap();

        let catalog = SoundCatalog::scan(root).unwrap();

        let names: Vec<_> = catalog.categories().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["anime", "memes"]);

        let memes: Vec<_> = catalog.categories()[1]
            .sounds
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(memes, ["alpha", "zeta"]);
    }

    #[test]
    fn duplicate_stems_keep_one_entry() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "memes/bonk.mp3");
        touch(dir.path(), "memes/bonk.wav");

        let catalog = SoundCatalog::scan(dir.path()).unwrap();
        let sounds = &catalog.categories()[0].sounds;

        assert_eq!(sounds.len(), 1);
        assert_eq!(sounds[0].path, dir.path().join("memes/bonk.mp3"));
    }

    #[test]
    fn keys_are_unique_and_ordered() {
        let dir = tempfile::tempdir().unwrap();
        for category in ["b", "a", "c"] {
            for sound in ["x", "m", "a", "B"] {
                touch(dir.path(), &format!("{category}/{sound}.mp3"));
            }
        }

        let catalog = SoundCatalog::scan(dir.path()).unwrap();

        let categories = catalog.categories();
        assert!(categories.windows(2).all(|w| w[0].name < w[1].name));
        for category in categories {
            assert!(category.sounds.windows(2).all(|w| w[0].name < w[1].name));
        }
    }

    #[test]
    fn find_and_get_agree() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "memes/bonk.mp3");
        touch(dir.path(), "memes/vine.mp3");

        let catalog = SoundCatalog::scan(dir.path()).unwrap();
        let sound_ref = catalog.find("memes", "vine").unwrap();

        assert_eq!(
            sound_ref,
            SoundRef {
                category: 0,
                sound: 1
            }
        );
        assert_eq!(catalog.get(sound_ref).unwrap().name, "vine");
        assert!(catalog.find("memes", "missing").is_none());
        assert!(catalog.find("missing", "vine").is_none());
        assert!(
            catalog
                .get(SoundRef {
                    category: 3,
                    sound: 0
                })
                .is_none()
        );
    }

    #[test]
    fn scan_missing_root_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SoundCatalog::scan(&dir.path().join("nope")).is_err());
    }
}
