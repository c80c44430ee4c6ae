//! Event types exchanged between a platform input hook and the capture loop.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A modifier key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModifierKey {
    Shift,
    Ctrl,
    Alt,
    Cmd,
}

impl ModifierKey {
    /// Map a platform key name (`shift`, `ctrl_l`, `alt_gr`, ...) to a modifier.
    pub fn from_name(name: &str) -> Option<Self> {
        let base = name
            .trim()
            .to_ascii_lowercase()
            .trim_end_matches("_l")
            .trim_end_matches("_r")
            .trim_end_matches("_gr")
            .to_string();

        match base.as_str() {
            "shift" => Some(ModifierKey::Shift),
            "ctrl" | "control" => Some(ModifierKey::Ctrl),
            "alt" | "option" => Some(ModifierKey::Alt),
            "cmd" | "super" | "meta" | "win" => Some(ModifierKey::Cmd),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            ModifierKey::Shift => "shift",
            ModifierKey::Ctrl => "ctrl",
            ModifierKey::Alt => "alt",
            ModifierKey::Cmd => "cmd",
        }
    }
}

/// Modifier state held while a key transition happened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub cmd: bool,
}

impl Modifiers {
    pub fn contains(&self, key: ModifierKey) -> bool {
        match key {
            ModifierKey::Shift => self.shift,
            ModifierKey::Ctrl => self.ctrl,
            ModifierKey::Alt => self.alt,
            ModifierKey::Cmd => self.cmd,
        }
    }

    pub fn with(mut self, key: ModifierKey) -> Self {
        match key {
            ModifierKey::Shift => self.shift = true,
            ModifierKey::Ctrl => self.ctrl = true,
            ModifierKey::Alt => self.alt = true,
            ModifierKey::Cmd => self.cmd = true,
        }
        self
    }
}

/// A key transition as delivered by a platform hook, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawKey {
    /// Character produced by the key, if any
    pub ch: Option<char>,
    /// Platform name for non-character keys (`space`, `enter`, `shift_l`)
    pub name: Option<String>,
    /// Virtual-key code
    pub vk: Option<u32>,
    /// Modifiers held during the transition
    pub modifiers: Modifiers,
}

impl RawKey {
    pub fn char(ch: char) -> Self {
        Self {
            ch: Some(ch),
            ..Self::default()
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn vk(code: u32) -> Self {
        Self {
            vk: Some(code),
            ..Self::default()
        }
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }
}

const SPACE_TOKEN: &str = "Key.space";

/// A normalized key event. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapturedKeyEvent {
    /// A printable character
    Char(char),
    /// A named control key, lowercased (`space`, `enter`, `backspace`)
    Named(String),
    /// A modifier state change
    Modifier(ModifierKey),
    /// A key that only reported a virtual-key code
    Unknown(u32),
}

impl CapturedKeyEvent {
    /// Normalize a raw key. Returns `None` when the hook gave us nothing usable.
    pub fn normalize(raw: &RawKey) -> Option<Self> {
        if let Some(name) = raw.name.as_deref().filter(|n| !n.trim().is_empty()) {
            if let Some(modifier) = ModifierKey::from_name(name) {
                return Some(CapturedKeyEvent::Modifier(modifier));
            }
            return Some(CapturedKeyEvent::Named(name.trim().to_ascii_lowercase()));
        }
        if let Some(ch) = raw.ch {
            return Some(CapturedKeyEvent::Char(ch));
        }
        raw.vk.map(CapturedKeyEvent::Unknown)
    }

    /// Textual token the keylog renderer works from.
    ///
    /// Named and modifier keys render as `Key.<name>`, characters as
    /// themselves and bare codes as `<code>`.
    pub fn token(&self) -> String {
        match self {
            CapturedKeyEvent::Char(c) => c.to_string(),
            CapturedKeyEvent::Named(name) => format!("Key.{name}"),
            CapturedKeyEvent::Modifier(m) => format!("Key.{}", m.name()),
            CapturedKeyEvent::Unknown(code) => format!("<{code}>"),
        }
    }

    /// Text this event contributes to the keylog.
    ///
    /// `Key.space` becomes a line break. Any other token containing `Key`
    /// is suppressed, and everything else is written literally. The
    /// substring match also suppresses a printable token that happens to
    /// contain `Key`.
    pub fn rendered(&self) -> Option<String> {
        let token = self.token();
        if token == SPACE_TOKEN {
            return Some("\n".to_string());
        }
        if token.contains("Key") {
            None
        } else {
            Some(token)
        }
    }
}

/// A press or release forwarded from the platform hook to the capture loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyInput {
    Press(RawKey),
    Release(RawKey),
}

/// Key combination that requests the capture loop to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseChord {
    pub modifier: ModifierKey,
    pub key: char,
}

impl Default for ReleaseChord {
    fn default() -> Self {
        Self {
            modifier: ModifierKey::Ctrl,
            key: 'z',
        }
    }
}

impl ReleaseChord {
    /// Whether a released key completes this chord.
    pub fn matches(&self, raw: &RawKey) -> bool {
        if !raw.modifiers.contains(self.modifier) {
            return false;
        }
        let by_char = raw
            .ch
            .map(|c| c.eq_ignore_ascii_case(&self.key))
            .unwrap_or(false);
        // With ctrl held some hooks report a control character or only the
        // virtual-key code, which for letters equals the uppercase ASCII code.
        let by_vk = raw
            .vk
            .map(|vk| vk == self.key.to_ascii_uppercase() as u32)
            .unwrap_or(false);
        by_char || by_vk
    }
}

impl FromStr for ReleaseChord {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (modifier, key) = s
            .split_once('+')
            .ok_or_else(|| format!("expected <modifier>+<key>, got '{s}'"))?;

        let modifier = ModifierKey::from_name(modifier)
            .ok_or_else(|| format!("unknown modifier '{modifier}'"))?;

        let mut chars = key.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_alphanumeric() => Ok(Self {
                modifier,
                key: c.to_ascii_lowercase(),
            }),
            _ => Err(format!("chord key must be a single letter or digit, got '{key}'")),
        }
    }
}

impl fmt::Display for ReleaseChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.modifier.name(), self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization() {
        assert_eq!(
            CapturedKeyEvent::normalize(&RawKey::char('a')),
            Some(CapturedKeyEvent::Char('a'))
        );
        assert_eq!(
            CapturedKeyEvent::normalize(&RawKey::named("Space")),
            Some(CapturedKeyEvent::Named("space".to_string()))
        );
        assert_eq!(
            CapturedKeyEvent::normalize(&RawKey::named("shift_r")),
            Some(CapturedKeyEvent::Modifier(ModifierKey::Shift))
        );
        assert_eq!(
            CapturedKeyEvent::normalize(&RawKey::vk(65437)),
            Some(CapturedKeyEvent::Unknown(65437))
        );
        assert_eq!(CapturedKeyEvent::normalize(&RawKey::default()), None);
    }

    #[test]
    fn test_space_renders_single_newline() {
        let space = CapturedKeyEvent::Named("space".to_string());
        assert_eq!(space.rendered().as_deref(), Some("\n"));
    }

    #[test]
    fn test_control_keys_render_nothing() {
        for name in ["enter", "backspace", "tab", "esc", "f5"] {
            assert_eq!(CapturedKeyEvent::Named(name.to_string()).rendered(), None);
        }
        for m in [
            ModifierKey::Shift,
            ModifierKey::Ctrl,
            ModifierKey::Alt,
            ModifierKey::Cmd,
        ] {
            assert_eq!(CapturedKeyEvent::Modifier(m).rendered(), None);
        }
    }

    #[test]
    fn test_keys_named_like_space_render_nothing() {
        for name in ["backspace", "nbspace", "space_alt"] {
            assert_eq!(
                CapturedKeyEvent::Named(name.to_string()).rendered(),
                None,
                "{name}"
            );
        }
    }

    #[test]
    fn test_printables_and_codes_render_literally() {
        assert_eq!(CapturedKeyEvent::Char('x').rendered().as_deref(), Some("x"));
        assert_eq!(CapturedKeyEvent::Char('K').rendered().as_deref(), Some("K"));
        assert_eq!(
            CapturedKeyEvent::Unknown(65437).rendered().as_deref(),
            Some("<65437>")
        );
    }

    #[test]
    fn test_chord_parsing_and_matching() {
        let chord: ReleaseChord = "ctrl+z".parse().unwrap();
        assert_eq!(chord, ReleaseChord::default());
        assert_eq!(chord.to_string(), "ctrl+z");

        let ctrl = Modifiers::default().with(ModifierKey::Ctrl);
        assert!(chord.matches(&RawKey::char('z').with_modifiers(ctrl)));
        assert!(chord.matches(&RawKey::char('Z').with_modifiers(ctrl)));
        assert!(chord.matches(&RawKey::vk(0x5A).with_modifiers(ctrl)));
        assert!(!chord.matches(&RawKey::char('z')));
        assert!(!chord.matches(&RawKey::char('x').with_modifiers(ctrl)));

        assert!("z".parse::<ReleaseChord>().is_err());
        assert!("hyper+z".parse::<ReleaseChord>().is_err());
        assert!("alt+zz".parse::<ReleaseChord>().is_err());
    }
}
