//! Color theme system for marginalia.
//!
//! A `Theme` holds named `ratatui::style::Color` fields for every surface
//! marginalia draws. Two built-in themes are provided:
//!
//! - `dark` uses ANSI 16 colors so it works on any terminal.
//! - `catppuccin_mocha` uses the Catppuccin Mocha palette in RGB and needs
//!   truecolor.

use ratatui::style::Color;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Theme {
    // Panel borders
    pub border_active: Color,
    pub border_inactive: Color,

    // Document view
    pub text: Color,
    pub heading: Color,
    pub code: Color,
    pub link: Color,
    pub image: Color,
    /// Background of a highlighted anchor.
    pub mark_bg: Color,
    /// Background of the anchor under the pointer.
    pub mark_hovered_bg: Color,
    /// Background of the anchor whose card has focus.
    pub mark_active_bg: Color,
    /// Background of the live selection.
    pub selection_bg: Color,

    // Sidebar cards
    pub card_border: Color,
    pub card_focused: Color,
    pub card_author: Color,
    pub card_quote: Color,
    pub card_draft: Color,
    pub card_hint: Color,

    // Status bar
    pub status_bar_bg: Color,
    pub status_bar_fg: Color,
    pub status_mode_normal: Color,
    pub status_mode_insert: Color,
    pub status_error: Color,
}

impl Theme {
    /// Built-in dark theme using ANSI 16 colors.
    pub fn dark() -> Self {
        Self {
            border_active: Color::Cyan,
            border_inactive: Color::DarkGray,

            text: Color::Reset,
            heading: Color::Cyan,
            code: Color::Green,
            link: Color::Blue,
            image: Color::Magenta,
            mark_bg: Color::Yellow,
            mark_hovered_bg: Color::LightYellow,
            mark_active_bg: Color::LightRed,
            selection_bg: Color::Blue,

            card_border: Color::DarkGray,
            card_focused: Color::Cyan,
            card_author: Color::Yellow,
            card_quote: Color::DarkGray,
            card_draft: Color::Green,
            card_hint: Color::DarkGray,

            status_bar_bg: Color::DarkGray,
            status_bar_fg: Color::White,
            status_mode_normal: Color::Cyan,
            status_mode_insert: Color::Green,
            status_error: Color::Red,
        }
    }

    /// Catppuccin Mocha theme using RGB truecolor values.
    ///
    /// Palette source: <https://github.com/catppuccin/catppuccin> Mocha variant.
    pub fn catppuccin_mocha() -> Self {
        let green = Color::Rgb(166, 227, 161); // #a6e3a1
        let red = Color::Rgb(243, 139, 168); // #f38ba8
        let blue = Color::Rgb(137, 180, 250); // #89b4fa
        let teal = Color::Rgb(148, 226, 213); // #94e2d5
        let lavender = Color::Rgb(180, 190, 254); // #b4befe
        let mauve = Color::Rgb(203, 166, 247); // #cba6f7
        let overlay1 = Color::Rgb(127, 132, 156); // #7f849c
        let surface1 = Color::Rgb(69, 71, 90); // #45475a
        let surface2 = Color::Rgb(88, 91, 112); // #585b70
        let text = Color::Rgb(205, 214, 244); // #cdd6f4
        let peach = Color::Rgb(250, 179, 135); // #fab387
        let mark = Color::Rgb(94, 84, 58);
        let mark_hover = Color::Rgb(122, 108, 66);
        let mark_active = Color::Rgb(140, 86, 64);

        Self {
            border_active: lavender,
            border_inactive: overlay1,

            text,
            heading: lavender,
            code: teal,
            link: blue,
            image: mauve,
            mark_bg: mark,
            mark_hovered_bg: mark_hover,
            mark_active_bg: mark_active,
            selection_bg: surface2,

            card_border: overlay1,
            card_focused: lavender,
            card_author: peach,
            card_quote: overlay1,
            card_draft: green,
            card_hint: overlay1,

            status_bar_bg: surface1,
            status_bar_fg: text,
            status_mode_normal: lavender,
            status_mode_insert: green,
            status_error: red,
        }
    }

    /// Resolves a theme name to a built-in theme. Unknown names fall back to
    /// `dark()` with a warning.
    pub fn from_name(name: &str) -> Self {
        match name {
            "catppuccin-mocha" | "catppuccin_mocha" => Self::catppuccin_mocha(),
            "dark" => Self::dark(),
            other => {
                warn!(theme = other, "unknown theme, falling back to 'dark'");
                Self::dark()
            }
        }
    }
}
