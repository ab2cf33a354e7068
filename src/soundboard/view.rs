use std::{cmp, ops::Range};

use crate::catalog::{SoundCatalog, SoundRef};
use crate::config::{PAGE_SIZE, ROW_WIDTH};

pub const ID_PREFIX: &str = "sb";
// Discord rejects button labels longer than this
const MAX_LABEL_CHARS: usize = 80;
const SPACER_LABEL: &str = "\u{200b}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    PrevCategory,
    NextCategory,
    PrevPage,
    NextPage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Navigate(Navigation),
    Play(SoundRef),
    /// Disabled filler, numbered so every button ID on a board stays unique
    Placeholder(usize),
}

impl ControlAction {
    pub fn custom_id(&self) -> String {
        match self {
            ControlAction::Navigate(Navigation::PrevCategory) => format!("{ID_PREFIX}:cat:prev"),
            ControlAction::Navigate(Navigation::NextCategory) => format!("{ID_PREFIX}:cat:next"),
            ControlAction::Navigate(Navigation::PrevPage) => format!("{ID_PREFIX}:page:prev"),
            ControlAction::Navigate(Navigation::NextPage) => format!("{ID_PREFIX}:page:next"),
            ControlAction::Play(sound) => {
                format!("{ID_PREFIX}:play:{}:{}", sound.category, sound.sound)
            }
            ControlAction::Placeholder(n) => format!("{ID_PREFIX}:pad:{n}"),
        }
    }

    /// Parse the parts of a custom ID following the `sb` prefix
    pub fn parse<'a>(mut action: impl Iterator<Item = &'a str>) -> Option<Self> {
        let parsed = match (action.next()?, action.next()?) {
            ("cat", "prev") => ControlAction::Navigate(Navigation::PrevCategory),
            ("cat", "next") => ControlAction::Navigate(Navigation::NextCategory),
            ("page", "prev") => ControlAction::Navigate(Navigation::PrevPage),
            ("page", "next") => ControlAction::Navigate(Navigation::NextPage),
            ("play", category) => ControlAction::Play(SoundRef {
                category: category.parse().ok()?,
                sound: action.next()?.parse().ok()?,
            }),
            ("pad", n) => ControlAction::Placeholder(n.parse().ok()?),
            _ => return None,
        };
        Some(parsed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlStyle {
    Secondary,
    Success,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub action: ControlAction,
    pub label: String,
    pub style: ControlStyle,
    pub disabled: bool,
}

impl Control {
    fn new(action: ControlAction, label: impl Into<String>, style: ControlStyle) -> Self {
        Self {
            action,
            label: label.into(),
            style,
            disabled: false,
        }
    }

    fn spacer(index: usize) -> Self {
        Self {
            action: ControlAction::Placeholder(index),
            label: SPACER_LABEL.to_string(),
            style: ControlStyle::Secondary,
            disabled: true,
        }
    }

    #[cfg(test)]
    pub fn is_placeholder(&self) -> bool {
        matches!(self.action, ControlAction::Placeholder(_))
    }
}

/// Everything needed to draw the board message, independent of the chat backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedBoard {
    pub header: String,
    pub controls: Vec<Control>,
    pub total_pages: usize,
}

impl RenderedBoard {
    pub fn all_disabled(&self) -> bool {
        self.controls.iter().all(|c| c.disabled)
    }

    #[cfg(test)]
    pub fn sound_controls(&self) -> impl Iterator<Item = &Control> {
        self.controls
            .iter()
            .filter(|c| matches!(c.action, ControlAction::Play(_)))
    }
}

/// The slice of a category's sounds shown on one page
#[derive(Clone, Debug, PartialEq)]
pub struct SoundPage {
    pub sounds: Range<usize>,
    pub page: usize,
    pub total_pages: usize,
}

impl SoundPage {
    /// Out of range pages fall back to the last one
    pub fn of(sound_count: usize, page: usize) -> Self {
        let total_pages = sound_count.div_ceil(PAGE_SIZE);
        let page = cmp::min(page, total_pages.saturating_sub(1));
        let first = page * PAGE_SIZE;

        Self {
            sounds: first..cmp::min(first + PAGE_SIZE, sound_count),
            page,
            total_pages,
        }
    }
}

/// Which category and page a board shows. Transitions return a new view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoundboardView {
    pub category: usize,
    pub page: usize,
    pub controls_enabled: bool,
}

impl Default for SoundboardView {
    fn default() -> Self {
        Self {
            category: 0,
            page: 0,
            controls_enabled: true,
        }
    }
}

impl SoundboardView {
    pub fn with_controls_enabled(self, controls_enabled: bool) -> Self {
        Self {
            controls_enabled,
            ..self
        }
    }

    fn category_sound_count(&self, catalog: &SoundCatalog) -> usize {
        catalog
            .category(self.category)
            .map_or(0, |category| category.sounds.len())
    }

    pub fn total_pages(&self, catalog: &SoundCatalog) -> usize {
        self.category_sound_count(catalog).div_ceil(PAGE_SIZE)
    }

    pub fn navigate(self, navigation: Navigation, catalog: &SoundCatalog) -> Self {
        let category_count = catalog.categories().len();

        match navigation {
            Navigation::PrevCategory | Navigation::NextCategory if category_count == 0 => self,
            Navigation::PrevCategory => Self {
                category: (self.category + category_count - 1) % category_count,
                page: 0,
                ..self
            },
            Navigation::NextCategory => Self {
                category: (self.category + 1) % category_count,
                page: 0,
                ..self
            },
            Navigation::PrevPage => Self {
                page: self.page.saturating_sub(1),
                ..self
            },
            Navigation::NextPage => Self {
                page: cmp::min(
                    self.page + 1,
                    self.total_pages(catalog).saturating_sub(1),
                ),
                ..self
            },
        }
    }

    pub fn render(&self, catalog: &SoundCatalog) -> RenderedBoard {
        let Some(category) = catalog.category(self.category) else {
            return RenderedBoard {
                header: "🎵 **Soundboard Controls**\nNo sounds are available.".to_string(),
                controls: Vec::new(),
                total_pages: 0,
            };
        };

        let shown = SoundPage::of(category.sounds.len(), self.page);
        let mut controls = Vec::new();
        let mut spacers = 0;
        let mut spacer = || {
            spacers += 1;
            Control::spacer(spacers)
        };

        if catalog.categories().len() > 1 {
            controls.push(Control::new(
                ControlAction::Navigate(Navigation::PrevCategory),
                "◀️ Prev Category",
                ControlStyle::Danger,
            ));
            controls.push(spacer());
            controls.push(Control::new(
                ControlAction::Navigate(Navigation::NextCategory),
                "Next Category ▶️",
                ControlStyle::Danger,
            ));
        }

        for sound in shown.sounds.clone() {
            controls.push(Control::new(
                ControlAction::Play(SoundRef {
                    category: self.category,
                    sound,
                }),
                truncate_label(&format!("🎵 {}", category.sounds[sound].name)),
                ControlStyle::Secondary,
            ));
        }

        let remaining_in_row = ROW_WIDTH - controls.len() % ROW_WIDTH;
        if remaining_in_row < ROW_WIDTH {
            for _ in 0..remaining_in_row {
                controls.push(spacer());
            }
        }

        if shown.total_pages > 1 {
            let mut prev_page = Control::new(
                ControlAction::Navigate(Navigation::PrevPage),
                "◀️ Prev Page",
                ControlStyle::Success,
            );
            prev_page.disabled = shown.page == 0;
            let mut next_page = Control::new(
                ControlAction::Navigate(Navigation::NextPage),
                "Next Page ▶️",
                ControlStyle::Success,
            );
            next_page.disabled = shown.page == shown.total_pages - 1;

            controls.push(prev_page);
            controls.push(spacer());
            controls.push(next_page);
        }

        if !self.controls_enabled {
            for control in &mut controls {
                control.disabled = true;
            }
        }

        let page_info = if shown.total_pages > 1 {
            format!(" (Page {}/{})", shown.page + 1, shown.total_pages)
        } else {
            String::new()
        };

        RenderedBoard {
            header: format!(
                "🎵 **Soundboard Controls**\n📂 Category: ```fix\n{}```{page_info}",
                category.name
            ),
            controls,
            total_pages: shown.total_pages,
        }
    }
}

fn truncate_label(label: &str) -> String {
    label.chars().take(MAX_LABEL_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::catalog::{Category, SoundEntry};

    fn catalog(sizes: &[(&str, usize)]) -> SoundCatalog {
        SoundCatalog::from_categories(
            sizes
                .iter()
                .map(|(name, count)| Category {
                    name: name.to_string(),
                    sounds: (0..*count)
                        .map(|i| SoundEntry {
                            name: format!("sound{i:02}"),
                            path: PathBuf::from(format!("{name}/sound{i:02}.mp3")),
                        })
                        .collect(),
                })
                .collect(),
        )
    }

    #[test]
    fn sound_pages() {
        assert_eq!(
            SoundPage::of(0, 0),
            SoundPage {
                sounds: 0..0,
                page: 0,
                total_pages: 0
            }
        );
        assert_eq!(
            SoundPage::of(37, 2),
            SoundPage {
                sounds: 30..37,
                page: 2,
                total_pages: 3
            }
        );
        // exactly one full page
        assert_eq!(SoundPage::of(15, 0).sounds, 0..15);
        assert_eq!(SoundPage::of(15, 0).total_pages, 1);
        assert_eq!(
            SoundPage::of(16, 9),
            SoundPage {
                sounds: 15..16,
                page: 1,
                total_pages: 2
            }
        );
    }

    #[test]
    fn page_navigation_clamps() {
        let catalog = catalog(&[("memes", 37)]);
        let view = SoundboardView::default();
        assert_eq!(view.total_pages(&catalog), 3);

        let view = view
            .navigate(Navigation::NextPage, &catalog)
            .navigate(Navigation::NextPage, &catalog);
        assert_eq!(view.page, 2);
        assert_eq!(view.navigate(Navigation::NextPage, &catalog).page, 2);

        let first = SoundboardView::default();
        assert_eq!(first.navigate(Navigation::PrevPage, &catalog).page, 0);
    }

    #[test]
    fn category_navigation_wraps() {
        let catalog = catalog(&[("a", 1), ("b", 20), ("c", 2)]);
        let last = SoundboardView {
            category: 2,
            ..Default::default()
        };
        assert_eq!(last.navigate(Navigation::NextCategory, &catalog).category, 0);

        let first = SoundboardView {
            page: 1,
            category: 0,
            ..Default::default()
        };
        let wrapped = first.navigate(Navigation::PrevCategory, &catalog);
        assert_eq!((wrapped.category, wrapped.page), (2, 0));

        // switching category always starts at the first page
        let on_second_page = SoundboardView {
            category: 1,
            page: 1,
            ..Default::default()
        };
        assert_eq!(
            on_second_page.navigate(Navigation::NextCategory, &catalog).page,
            0
        );
    }

    #[test]
    fn render_full_page_with_all_navigation() {
        let catalog = catalog(&[("anime", 2), ("memes", 37)]);
        let view = SoundboardView {
            category: 1,
            page: 2,
            ..Default::default()
        };
        let board = view.render(&catalog);

        assert_eq!(board.total_pages, 3);
        assert!(board.header.contains("```fix\nmemes```"));
        assert!(board.header.ends_with("(Page 3/3)"));

        // 3 category nav + 7 sounds + 2 pad + 3 page nav
        assert_eq!(board.controls.len(), 15);
        assert_eq!(board.sound_controls().count(), 7);
        assert_eq!(board.controls[..12].len() % ROW_WIDTH, 0);

        let next_page = board.controls.last().unwrap();
        let prev_page = &board.controls[board.controls.len() - 3];
        assert_eq!(next_page.action, ControlAction::Navigate(Navigation::NextPage));
        assert!(next_page.disabled);
        assert!(!prev_page.disabled);
    }

    #[test]
    fn render_single_category_single_page() {
        let catalog = catalog(&[("memes", 4)]);
        let board = SoundboardView::default().render(&catalog);

        // 4 sounds padded to 6, no navigation rows
        assert_eq!(board.controls.len(), 6);
        assert!(board.controls[4..].iter().all(Control::is_placeholder));
        assert!(board.controls[4..].iter().all(|c| c.disabled));
        assert!(!board.header.contains("Page"));
        assert!(
            board
                .controls
                .iter()
                .all(|c| !matches!(c.action, ControlAction::Navigate(_)))
        );
    }

    #[test]
    fn render_is_deterministic_with_unique_ids() {
        let catalog = catalog(&[("a", 16), ("b", 3)]);
        let view = SoundboardView::default();
        assert_eq!(view.render(&catalog), view.render(&catalog));

        let board = view.render(&catalog);
        let mut ids: Vec<_> = board.controls.iter().map(|c| c.action.custom_id()).collect();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total);
        // stays within Discord's 5x5 button grid
        assert!(total <= 25);
    }

    #[test]
    fn disabled_view_disables_everything() {
        let catalog = catalog(&[("a", 16), ("b", 3)]);
        let board = SoundboardView::default()
            .with_controls_enabled(false)
            .render(&catalog);
        assert!(board.all_disabled());

        let enabled = SoundboardView::default().render(&catalog);
        assert!(enabled.sound_controls().all(|c| !c.disabled));
    }

    #[test]
    fn empty_catalog_renders_placeholder_text() {
        let board = SoundboardView::default().render(&SoundCatalog::default());
        assert!(board.controls.is_empty());
        assert_eq!(board.total_pages, 0);
        assert_eq!(
            SoundboardView::default()
                .navigate(Navigation::NextCategory, &SoundCatalog::default()),
            SoundboardView::default()
        );
    }

    #[test]
    fn custom_ids_parse_back() {
        for action in [
            ControlAction::Navigate(Navigation::PrevCategory),
            ControlAction::Navigate(Navigation::NextPage),
            ControlAction::Play(SoundRef {
                category: 4,
                sound: 12,
            }),
            ControlAction::Placeholder(3),
        ] {
            let id = action.custom_id();
            let mut parts = id.split(':');
            assert_eq!(parts.next(), Some(ID_PREFIX));
            assert_eq!(ControlAction::parse(parts), Some(action));
        }

        assert_eq!(ControlAction::parse("play:x:1".split(':')), None);
        assert_eq!(ControlAction::parse("cat".split(':')), None);
    }

    #[test]
    fn long_labels_are_truncated() {
        let long = "x".repeat(200);
        assert_eq!(truncate_label(&long).chars().count(), MAX_LABEL_CHARS);
    }
}
