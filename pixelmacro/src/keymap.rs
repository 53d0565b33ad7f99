//! Maps between recorded key names and the rdev key vocabulary.
//!
//! Stored events use lowercase names ("a", "enter", "page_up") so macros
//! stay readable and portable; the listener and actuator translate at the
//! boundary.

use rdev::Key;

/// The rdev key for a recorded key name, or `None` for names outside the
/// supported vocabulary
pub fn key_for_name(name: &str) -> Option<Key> {
    let named = match name {
        "space" => Some(Key::Space),
        "enter" | "return" => Some(Key::Return),
        "tab" => Some(Key::Tab),
        "backspace" => Some(Key::Backspace),
        "esc" | "escape" => Some(Key::Escape),
        "shift" => Some(Key::ShiftLeft),
        "ctrl" => Some(Key::ControlLeft),
        "alt" => Some(Key::Alt),
        "cmd" | "win" | "meta" | "super" => Some(Key::MetaLeft),
        "up" => Some(Key::UpArrow),
        "down" => Some(Key::DownArrow),
        "left" => Some(Key::LeftArrow),
        "right" => Some(Key::RightArrow),
        "page_up" | "pageup" => Some(Key::PageUp),
        "page_down" | "pagedown" => Some(Key::PageDown),
        "home" => Some(Key::Home),
        "end" => Some(Key::End),
        "insert" => Some(Key::Insert),
        "delete" => Some(Key::Delete),
        "caps_lock" | "capslock" => Some(Key::CapsLock),
        "num_lock" => Some(Key::NumLock),
        "scroll_lock" => Some(Key::ScrollLock),
        "print_screen" => Some(Key::PrintScreen),
        "pause" => Some(Key::Pause),
        "f1" => Some(Key::F1),
        "f2" => Some(Key::F2),
        "f3" => Some(Key::F3),
        "f4" => Some(Key::F4),
        "f5" => Some(Key::F5),
        "f6" => Some(Key::F6),
        "f7" => Some(Key::F7),
        "f8" => Some(Key::F8),
        "f9" => Some(Key::F9),
        "f10" => Some(Key::F10),
        "f11" => Some(Key::F11),
        "f12" => Some(Key::F12),
        _ => None,
    };
    if named.is_some() {
        return named;
    }

    // Single printable characters pass through lower-cased; shifted
    // symbols fold onto the key that produces them.
    let mut chars = name.chars();
    let c = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    let c = c.to_ascii_lowercase();
    key_for_char(unshifted(c).unwrap_or(c))
}

/// The stored name for a printable character: lower-cased, with shifted
/// symbols folded onto their base key ("!" records as "1", ":" as ";") so
/// the press matches the release and replays through `key_for_name`
pub fn char_name(c: char) -> String {
    match unshifted(c) {
        Some(base) => base.to_string(),
        None => c.to_lowercase().to_string(),
    }
}

// US-layout shift pairs.
fn unshifted(c: char) -> Option<char> {
    Some(match c {
        '!' => '1',
        '@' => '2',
        '#' => '3',
        '$' => '4',
        '%' => '5',
        '^' => '6',
        '&' => '7',
        '*' => '8',
        '(' => '9',
        ')' => '0',
        '_' => '-',
        '+' => '=',
        '{' => '[',
        '}' => ']',
        '|' => '\\',
        ':' => ';',
        '"' => '\'',
        '<' => ',',
        '>' => '.',
        '?' => '/',
        '~' => '`',
        _ => return None,
    })
}

fn key_for_char(c: char) -> Option<Key> {
    Some(match c {
        'a' => Key::KeyA,
        'b' => Key::KeyB,
        'c' => Key::KeyC,
        'd' => Key::KeyD,
        'e' => Key::KeyE,
        'f' => Key::KeyF,
        'g' => Key::KeyG,
        'h' => Key::KeyH,
        'i' => Key::KeyI,
        'j' => Key::KeyJ,
        'k' => Key::KeyK,
        'l' => Key::KeyL,
        'm' => Key::KeyM,
        'n' => Key::KeyN,
        'o' => Key::KeyO,
        'p' => Key::KeyP,
        'q' => Key::KeyQ,
        'r' => Key::KeyR,
        's' => Key::KeyS,
        't' => Key::KeyT,
        'u' => Key::KeyU,
        'v' => Key::KeyV,
        'w' => Key::KeyW,
        'x' => Key::KeyX,
        'y' => Key::KeyY,
        'z' => Key::KeyZ,
        '0' => Key::Num0,
        '1' => Key::Num1,
        '2' => Key::Num2,
        '3' => Key::Num3,
        '4' => Key::Num4,
        '5' => Key::Num5,
        '6' => Key::Num6,
        '7' => Key::Num7,
        '8' => Key::Num8,
        '9' => Key::Num9,
        '-' => Key::Minus,
        '=' => Key::Equal,
        '[' => Key::LeftBracket,
        ']' => Key::RightBracket,
        ';' => Key::SemiColon,
        '\'' => Key::Quote,
        '\\' => Key::BackSlash,
        ',' => Key::Comma,
        '.' => Key::Dot,
        '/' => Key::Slash,
        '`' => Key::BackQuote,
        _ => return None,
    })
}

/// The recorded name for a key seen by the listener, or `None` for keys
/// with no place in the stored vocabulary
pub fn name_for_key(key: Key) -> Option<String> {
    let name = match key {
        Key::Space => "space",
        Key::Return | Key::KpReturn => "enter",
        Key::Tab => "tab",
        Key::Backspace => "backspace",
        Key::Escape => "esc",
        Key::ShiftLeft | Key::ShiftRight => "shift",
        Key::ControlLeft | Key::ControlRight => "ctrl",
        Key::Alt | Key::AltGr => "alt",
        Key::MetaLeft | Key::MetaRight => "cmd",
        Key::UpArrow => "up",
        Key::DownArrow => "down",
        Key::LeftArrow => "left",
        Key::RightArrow => "right",
        Key::PageUp => "page_up",
        Key::PageDown => "page_down",
        Key::Home => "home",
        Key::End => "end",
        Key::Insert => "insert",
        Key::Delete | Key::KpDelete => "delete",
        Key::CapsLock => "caps_lock",
        Key::NumLock => "num_lock",
        Key::ScrollLock => "scroll_lock",
        Key::PrintScreen => "print_screen",
        Key::Pause => "pause",
        Key::F1 => "f1",
        Key::F2 => "f2",
        Key::F3 => "f3",
        Key::F4 => "f4",
        Key::F5 => "f5",
        Key::F6 => "f6",
        Key::F7 => "f7",
        Key::F8 => "f8",
        Key::F9 => "f9",
        Key::F10 => "f10",
        Key::F11 => "f11",
        Key::F12 => "f12",
        Key::KeyA => "a",
        Key::KeyB => "b",
        Key::KeyC => "c",
        Key::KeyD => "d",
        Key::KeyE => "e",
        Key::KeyF => "f",
        Key::KeyG => "g",
        Key::KeyH => "h",
        Key::KeyI => "i",
        Key::KeyJ => "j",
        Key::KeyK => "k",
        Key::KeyL => "l",
        Key::KeyM => "m",
        Key::KeyN => "n",
        Key::KeyO => "o",
        Key::KeyP => "p",
        Key::KeyQ => "q",
        Key::KeyR => "r",
        Key::KeyS => "s",
        Key::KeyT => "t",
        Key::KeyU => "u",
        Key::KeyV => "v",
        Key::KeyW => "w",
        Key::KeyX => "x",
        Key::KeyY => "y",
        Key::KeyZ => "z",
        Key::Num0 | Key::Kp0 => "0",
        Key::Num1 | Key::Kp1 => "1",
        Key::Num2 | Key::Kp2 => "2",
        Key::Num3 | Key::Kp3 => "3",
        Key::Num4 | Key::Kp4 => "4",
        Key::Num5 | Key::Kp5 => "5",
        Key::Num6 | Key::Kp6 => "6",
        Key::Num7 | Key::Kp7 => "7",
        Key::Num8 | Key::Kp8 => "8",
        Key::Num9 | Key::Kp9 => "9",
        Key::Minus | Key::KpMinus => "-",
        Key::Equal => "=",
        Key::LeftBracket => "[",
        Key::RightBracket => "]",
        Key::SemiColon => ";",
        Key::Quote => "'",
        Key::BackSlash => "\\",
        Key::Comma => ",",
        Key::Dot => ".",
        Key::Slash | Key::KpDivide => "/",
        Key::BackQuote => "`",
        _ => return None,
    };
    Some(name.to_string())
}
