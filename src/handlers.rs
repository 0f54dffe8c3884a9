//! Default handler chain for the `wrap` subcommand: echo STDIN/STDOUT to the
//! real stdout and STDERR to the real stderr, translating bare LF to CRLF so
//! output looks right on a raw-mode terminal.

use crate::segmenter::{Event, Handler, HandlerRegistry};

struct CrlfTranslate;

impl Handler for CrlfTranslate {
    fn apply(&self, bytes: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(bytes.len());
        let mut prev = 0u8;
        for &b in bytes {
            if b == b'\n' && prev != b'\r' {
                out.push(b'\r');
            }
            out.push(b);
            prev = b;
        }
        out
    }
}

struct Identity;

impl Handler for Identity {
    fn apply(&self, bytes: &[u8]) -> Vec<u8> {
        bytes.to_vec()
    }
}

/// Build the default registry used by `pasta wrap`: STDIN passes through
/// untouched (it is already terminal-formatted), STDOUT/STDERR get CRLF
/// translation so raw-mode output renders correctly.
pub fn default_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(Event::Stdin, Box::new(Identity));
    registry.register(Event::Stdout, Box::new(CrlfTranslate));
    registry.register(Event::Stderr, Box::new(CrlfTranslate));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crlf_translate_leaves_existing_crlf_alone() {
        let h = CrlfTranslate;
        assert_eq!(h.apply(b"a\r\nb"), b"a\r\nb".to_vec());
    }

    #[test]
    fn crlf_translate_inserts_cr_before_bare_lf() {
        let h = CrlfTranslate;
        assert_eq!(h.apply(b"a\nb"), b"a\r\nb".to_vec());
    }
}
