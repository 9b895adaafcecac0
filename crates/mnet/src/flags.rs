//! The compact flags string carried on every packet (spec §3).
//!
//! Tags are comma-separated tokens. The tag set is extensible — per the
//! wire-compatibility note in spec §6, unknown tags are parsed into
//! [`Flags::extra`] and re-emitted verbatim rather than dropped.

use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flags {
    /// `s1` — this packet starts a fresh logical stream.
    pub syn: bool,
    /// `rN` — reliable, requires acknowledgement.
    pub reliable: bool,
    /// `aN` — this packet is itself an acknowledgement.
    pub ack: bool,
    /// `fN` — fragmentation marker. `Some(0)` means more fragments follow;
    /// `Some(n)` with `n > 0` means this is the final fragment of an
    /// `n`-fragment group. `None` means the packet carries no frag tag
    /// (a single-fragment send may omit it, per spec §4.2).
    pub frag: Option<u32>,
    /// Any tag this implementation doesn't recognize, preserved for
    /// round-tripping through a mixed-version mesh.
    pub extra: Vec<String>,
}

impl Flags {
    pub fn is_final_fragment(&self) -> bool {
        matches!(self.frag, Some(n) if n > 0)
    }

    pub fn is_more_fragments(&self) -> bool {
        matches!(self.frag, Some(0))
    }

    pub fn parse(s: &str) -> Self {
        let mut flags = Flags::default();
        for tok in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let mut chars = tok.chars();
            match chars.next() {
                Some('s') => flags.syn = true,
                Some('r') => flags.reliable = true,
                Some('a') => flags.ack = true,
                Some('f') => {
                    if let Ok(n) = chars.as_str().parse::<u32>() {
                        flags.frag = Some(n);
                    } else {
                        flags.extra.push(tok.to_string());
                    }
                }
                _ => flags.extra.push(tok.to_string()),
            }
        }
        flags
    }

    pub fn render(&self) -> String {
        let mut parts = Vec::new();
        if self.syn {
            parts.push("s1".to_string());
        }
        if self.reliable {
            parts.push("r1".to_string());
        }
        if self.ack {
            parts.push("a1".to_string());
        }
        if let Some(n) = self.frag {
            parts.push(format!("f{n}"));
        }
        parts.extend(self.extra.iter().cloned());
        parts.join(",")
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_render_and_parse() {
        let flags = Flags { syn: true, reliable: true, ack: false, frag: Some(0), extra: vec![] };
        let rendered = flags.render();
        assert_eq!(Flags::parse(&rendered), flags);
    }

    #[test]
    fn final_fragment_requires_nonzero_count() {
        assert!(Flags::parse("f6").is_final_fragment());
        assert!(!Flags::parse("f0").is_final_fragment());
        assert!(Flags::parse("f0").is_more_fragments());
    }

    #[test]
    fn unknown_tags_round_trip() {
        let flags = Flags::parse("s1,xyz123");
        assert_eq!(flags.extra, vec!["xyz123".to_string()]);
        assert_eq!(flags.render(), "s1,xyz123");
    }
}
