//! Escaping von Sonderzeichen nach TS3-Konvention
//!
//! Bidirektionale Tabelle:
//!
//! | Zeichen          | Sequenz |
//! |------------------|---------|
//! | `\`              | `\\`    |
//! | `/`              | `\/`    |
//! | Leerzeichen      | `\s`    |
//! | `\|`             | `\p`    |
//! | BEL, BS, FF      | `\a` `\b` `\f` |
//! | LF, CR, TAB, VT  | `\n` `\r` `\t` `\v` |
//!
//! `ts_unescape(ts_escape(s)) == s` gilt fuer beliebige Eingaben.

/// Escaped alle Sonderzeichen eines Strings fuer den Wire-Versand
pub fn ts_escape(text: &str) -> String {
    let mut ausgabe = String::with_capacity(text.len());
    for zeichen in text.chars() {
        match zeichen {
            '\\' => ausgabe.push_str("\\\\"),
            '/' => ausgabe.push_str("\\/"),
            ' ' => ausgabe.push_str("\\s"),
            '|' => ausgabe.push_str("\\p"),
            '\x07' => ausgabe.push_str("\\a"),
            '\x08' => ausgabe.push_str("\\b"),
            '\x0c' => ausgabe.push_str("\\f"),
            '\n' => ausgabe.push_str("\\n"),
            '\r' => ausgabe.push_str("\\r"),
            '\t' => ausgabe.push_str("\\t"),
            '\x0b' => ausgabe.push_str("\\v"),
            _ => ausgabe.push(zeichen),
        }
    }
    ausgabe
}

/// Dekodiert Escape-Sequenzen eines empfangenen Wertes
///
/// Unbekannte Sequenzen bleiben unveraendert erhalten (Backslash und
/// Folgezeichen werden durchgereicht), ein einzelner Backslash am Ende
/// ebenfalls.
pub fn ts_unescape(text: &str) -> String {
    let mut ausgabe = String::with_capacity(text.len());
    let mut zeichen = text.chars();
    while let Some(z) = zeichen.next() {
        if z != '\\' {
            ausgabe.push(z);
            continue;
        }
        match zeichen.next() {
            Some('\\') => ausgabe.push('\\'),
            Some('/') => ausgabe.push('/'),
            Some('s') => ausgabe.push(' '),
            Some('p') => ausgabe.push('|'),
            Some('a') => ausgabe.push('\x07'),
            Some('b') => ausgabe.push('\x08'),
            Some('f') => ausgabe.push('\x0c'),
            Some('n') => ausgabe.push('\n'),
            Some('r') => ausgabe.push('\r'),
            Some('t') => ausgabe.push('\t'),
            Some('v') => ausgabe.push('\x0b'),
            Some(anderes) => {
                ausgabe.push('\\');
                ausgabe.push(anderes);
            }
            None => ausgabe.push('\\'),
        }
    }
    ausgabe
}
