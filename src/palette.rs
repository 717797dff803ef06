//! Background palette offered after a photo upload, and color parsing for
//! recomposite requests.

use image::Rgba;
use regex::Regex;
use std::sync::LazyLock;

static HEX_COLOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#?([0-9a-fA-F]{6}|[0-9a-fA-F]{3})$").expect("valid hex color regex")
});

const CALLBACK_PREFIX: &str = "bg:";

/// One selectable background
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackgroundChoice {
    White,
    Black,
    Transparent,
    Gray,
    Red,
    Blue,
    Green,
    Yellow,
    Purple,
    Orange,
    Pink,
    Brown,
    Navy,
}

impl BackgroundChoice {
    pub const BASE: [BackgroundChoice; 7] = [
        BackgroundChoice::White,
        BackgroundChoice::Black,
        BackgroundChoice::Transparent,
        BackgroundChoice::Gray,
        BackgroundChoice::Red,
        BackgroundChoice::Blue,
        BackgroundChoice::Green,
    ];

    pub const EXTENDED: [BackgroundChoice; 6] = [
        BackgroundChoice::Yellow,
        BackgroundChoice::Purple,
        BackgroundChoice::Orange,
        BackgroundChoice::Pink,
        BackgroundChoice::Brown,
        BackgroundChoice::Navy,
    ];

    /// Base palette followed by the extended one
    pub fn all() -> impl Iterator<Item = BackgroundChoice> {
        Self::BASE.into_iter().chain(Self::EXTENDED)
    }

    pub fn name(self) -> &'static str {
        match self {
            BackgroundChoice::White => "white",
            BackgroundChoice::Black => "black",
            BackgroundChoice::Transparent => "transparent",
            BackgroundChoice::Gray => "gray",
            BackgroundChoice::Red => "red",
            BackgroundChoice::Blue => "blue",
            BackgroundChoice::Green => "green",
            BackgroundChoice::Yellow => "yellow",
            BackgroundChoice::Purple => "purple",
            BackgroundChoice::Orange => "orange",
            BackgroundChoice::Pink => "pink",
            BackgroundChoice::Brown => "brown",
            BackgroundChoice::Navy => "navy",
        }
    }

    fn swatch(self) -> &'static str {
        match self {
            BackgroundChoice::White => "⬜",
            BackgroundChoice::Black => "⬛",
            BackgroundChoice::Transparent => "🔳",
            BackgroundChoice::Gray => "🩶",
            BackgroundChoice::Red => "🟥",
            BackgroundChoice::Blue => "🟦",
            BackgroundChoice::Green => "🟩",
            BackgroundChoice::Yellow => "🟨",
            BackgroundChoice::Purple => "🟪",
            BackgroundChoice::Orange => "🟧",
            BackgroundChoice::Pink => "🌸",
            BackgroundChoice::Brown => "🟫",
            BackgroundChoice::Navy => "🔵",
        }
    }

    /// Button label, e.g. `🟥 Red`
    pub fn label(self) -> String {
        let name = self.name();
        let mut chars = name.chars();
        let capitalized = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
            None => String::new(),
        };
        format!("{} {}", self.swatch(), capitalized)
    }

    /// RGB value; `None` keeps the background transparent
    pub fn rgb(self) -> Option<[u8; 3]> {
        match self {
            BackgroundChoice::White => Some([0xff, 0xff, 0xff]),
            BackgroundChoice::Black => Some([0x00, 0x00, 0x00]),
            BackgroundChoice::Transparent => None,
            BackgroundChoice::Gray => Some([0x80, 0x80, 0x80]),
            BackgroundChoice::Red => Some([0xff, 0x00, 0x00]),
            BackgroundChoice::Blue => Some([0x00, 0x00, 0xff]),
            BackgroundChoice::Green => Some([0x00, 0x80, 0x00]),
            BackgroundChoice::Yellow => Some([0xff, 0xff, 0x00]),
            BackgroundChoice::Purple => Some([0x80, 0x00, 0x80]),
            BackgroundChoice::Orange => Some([0xff, 0xa5, 0x00]),
            BackgroundChoice::Pink => Some([0xff, 0xc0, 0xcb]),
            BackgroundChoice::Brown => Some([0xa5, 0x2a, 0x2a]),
            BackgroundChoice::Navy => Some([0x00, 0x00, 0x80]),
        }
    }

    /// Value for the API's `bg_color` field (hex without `#`)
    pub fn api_color(self) -> Option<String> {
        self.rgb()
            .map(|[r, g, b]| format!("{:02x}{:02x}{:02x}", r, g, b))
    }

    pub fn callback_data(self) -> String {
        format!("{}{}", CALLBACK_PREFIX, self.name())
    }

    pub fn from_callback(data: &str) -> Option<Self> {
        data.strip_prefix(CALLBACK_PREFIX).and_then(Self::from_name)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        let name = if name == "grey" { "gray".to_string() } else { name };
        Self::all().find(|choice| choice.name() == name)
    }
}

/// Parse a palette color name or a `#rrggbb` / `#rgb` value into an opaque color.
///
/// `transparent` is rejected: a recomposite always needs a visible canvas.
pub fn parse_color(text: &str) -> Option<Rgba<u8>> {
    let text = text.trim();

    if let Some(choice) = BackgroundChoice::from_name(text) {
        return choice.rgb().map(|[r, g, b]| Rgba([r, g, b, 0xff]));
    }

    let captures = HEX_COLOR_RE.captures(text)?;
    let hex = captures.get(1)?.as_str();
    let expanded: String = if hex.len() == 3 {
        hex.chars().flat_map(|c| [c, c]).collect()
    } else {
        hex.to_string()
    };

    let channel = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).ok();
    Some(Rgba([channel(0)?, channel(2)?, channel(4)?, 0xff]))
}
