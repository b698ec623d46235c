#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
    Space,
    Char(char),
    ArrowLeft,
    ArrowRight,
}

impl Key {
    /// Maps a DOM-style key name (`"Escape"`, `" "`, `"k"`, `"ArrowLeft"`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Escape" | "Esc" => Some(Key::Escape),
            " " | "Space" | "Spacebar" => Some(Key::Space),
            "ArrowLeft" => Some(Key::ArrowLeft),
            "ArrowRight" => Some(Key::ArrowRight),
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(Key::Char(c)),
                    _ => None,
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    Handled,
    Ignored,
    /// The player should be closed (navigate back).
    Close,
}
