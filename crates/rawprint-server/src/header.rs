// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PostScript header parser.
//
// Windows and macOS spoolers put the job title and the submitting user in
// the document-structuring comments at the top of the PostScript stream.
// Some drivers prefix the stream with a PJL job preamble:
//
// ```text
// <ESC>%-12345X@PJL
// @PJL JOB NAME = "Document 1" DISPLAY = "9729 john Document 1"
// @PJL SET USERNAME = "john"
// @PJL ENTER LANGUAGE = POSTSCRIPT
// %!PS-Adobe-3.0
// %%Creator: GPL Ghostscript 918 (ps2write)
// %%For: (john)
// %%Title: (Document 1)
// %%EndComments
// %%BeginProlog
// ```
//
// The parser walks START -> SKIP_PJL* -> CHECK_SIGNATURE -> SCAN_HEADER*
// and ends either accepted or rejected.  Rejections are values, not errors:
// only genuine I/O failures come back as `Err`.

use std::io;
use std::net::IpAddr;

use tokio::io::AsyncRead;
use tracing::trace;

use rawprint_core::error::RawPrintError;
use rawprint_core::types::ParsedJobHeader;

use crate::line_reader::TeeLineReader;
use crate::services::UserDirectory;

/// Universal Exit Language command that opens a PJL job.
pub const UEL_SIGNATURE: &str = "\x1b%-12345X";

/// Prefix of every PJL command line.
pub const PJL_COMMAND_PREFIX: &str = "@PJL";

/// First line of a conforming PostScript document.
pub const POSTSCRIPT_SIGNATURE: &str = "%!PS-Adobe";

const TITLE_PREFIX: &str = "%%Title: ";
const USER_PREFIX: &str = "%%For: ";
const BEGIN_PROLOG: &str = "%%BeginProlog";

/// Characters of an offending line quoted in a "not PostScript" rejection.
const SNIPPET_CHARS: usize = 10;

/// Terminal state of the header parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderOutcome {
    /// The peer closed without sending anything.
    Empty,
    Accepted(ParsedJobHeader),
    Rejected(Rejection),
}

/// Why a stream was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The first significant line is not a PostScript signature.
    NotPostScript { snippet: String },
    /// `%%Title:` or `%%For:` was absent before `%%BeginProlog` or end of
    /// stream.
    MissingHeaderFields {
        title: Option<String>,
        user: Option<String>,
    },
}

impl Rejection {
    pub fn into_error(self, peer: IpAddr) -> RawPrintError {
        match self {
            Self::NotPostScript { snippet } => RawPrintError::NotPostScript { peer, snippet },
            Self::MissingHeaderFields { .. } => RawPrintError::MissingHeaderFields { peer },
        }
    }
}

/// Parse the job header off the front of `reader`.
///
/// On acceptance the returned header owns every byte consumed so far, and
/// `reader` is positioned at the first byte after the last header line read.
///
/// A reader built with a limit bounds how much of the stream the header may
/// occupy.  Running out of it counts as a bad first line when it happens
/// there, and as missing header fields anywhere later.
pub async fn parse_header<R>(
    reader: &mut TeeLineReader<R>,
    users: &dyn UserDirectory,
) -> io::Result<HeaderOutcome>
where
    R: AsyncRead + Unpin,
{
    // START
    let Some(first) = reader.read_line().await? else {
        if reader.limit_reached() {
            let snippet = snippet(&String::from_utf8_lossy(reader.read_ahead()));
            return Ok(HeaderOutcome::Rejected(Rejection::NotPostScript { snippet }));
        }
        return Ok(HeaderOutcome::Empty);
    };

    // SKIP_PJL
    let candidate = if first.starts_with(UEL_SIGNATURE) {
        skip_pjl_lines(reader).await?
    } else {
        Some(first)
    };

    // CHECK_SIGNATURE
    let signature = match candidate {
        Some(line) if line.starts_with(POSTSCRIPT_SIGNATURE) => line,
        other => {
            let snippet = snippet(other.as_deref().unwrap_or_default());
            return Ok(HeaderOutcome::Rejected(Rejection::NotPostScript { snippet }));
        }
    };

    // SCAN_HEADER
    let mut title: Option<String> = None;
    let mut user: Option<String> = None;
    let mut header_lines = Vec::new();
    let mut line = Some(signature);

    while let Some(current) = line {
        let end_of_comments = current.starts_with(BEGIN_PROLOG);

        if let Some(value) = current.strip_prefix(TITLE_PREFIX) {
            let value = strip_parentheses(value);
            if !value.is_empty() {
                title = Some(value.to_owned());
            }
        } else if let Some(value) = current.strip_prefix(USER_PREFIX) {
            let value = strip_parentheses(value);
            if !value.is_empty() {
                user = Some(value.to_owned());
            }
        }
        header_lines.push(current);

        if end_of_comments || (title.is_some() && user.is_some()) {
            break;
        }
        line = reader.read_line().await?;
    }

    if reader.limit_reached() {
        trace!(
            bytes = reader.read_ahead().len(),
            "header limit reached before the job fields"
        );
    }

    let normalized = user.as_deref().map(|u| users.normalize(u));
    match (title, normalized) {
        (Some(title), Some(user)) if !user.is_empty() => {
            Ok(HeaderOutcome::Accepted(ParsedJobHeader {
                title,
                user,
                raw_header_bytes: reader.take_read_ahead(),
                is_postscript: true,
                header_lines,
            }))
        }
        (title, _) => Ok(HeaderOutcome::Rejected(Rejection::MissingHeaderFields {
            title,
            user,
        })),
    }
}

/// Read past PJL command lines and the blank lines CR LF pairs leave
/// behind.  Returns the first other line, if any.
async fn skip_pjl_lines<R>(reader: &mut TeeLineReader<R>) -> io::Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    loop {
        match reader.read_line().await? {
            Some(line) if line.is_empty() || line.starts_with(PJL_COMMAND_PREFIX) => continue,
            other => return Ok(other),
        }
    }
}

fn snippet(line: &str) -> String {
    line.chars().take(SNIPPET_CHARS).collect()
}

/// Trim, then drop one leading `(` and one trailing `)`.
pub fn strip_parentheses(content: &str) -> &str {
    let trimmed = content.trim();
    let trimmed = trimmed.strip_prefix('(').unwrap_or(trimmed);
    trimmed.strip_suffix(')').unwrap_or(trimmed)
}

/// Dump up to `max` retained header lines at trace level.
pub fn trace_header_lines(lines: &[String], max: usize) {
    for line in lines.iter().take(max) {
        trace!("{line}");
    }
    if lines.len() > max {
        trace!("... {} more lines", lines.len() - max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::LowercaseUsers;

    async fn parse(data: &'static [u8]) -> (HeaderOutcome, TeeLineReader<&'static [u8]>) {
        let mut reader = TeeLineReader::new(data);
        let outcome = parse_header(&mut reader, &LowercaseUsers::default())
            .await
            .expect("in-memory read cannot fail");
        (outcome, reader)
    }

    fn accepted(outcome: HeaderOutcome) -> ParsedJobHeader {
        match outcome {
            HeaderOutcome::Accepted(header) => header,
            other => panic!("expected acceptance, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn bare_postscript_header() {
        let data = b"%!PS-Adobe-3.0\n%%Title: (Report)\n%%For: (jsmith)\n%%BeginProlog\n...";
        let (outcome, _) = parse(data).await;
        let header = accepted(outcome);

        assert_eq!(header.title, "Report");
        assert_eq!(header.user, "jsmith");
        assert!(header.is_postscript);
        assert!(header.is_dispatchable());
        assert_eq!(
            header.raw_header_bytes,
            b"%!PS-Adobe-3.0\n%%Title: (Report)\n%%For: (jsmith)\n"
        );
    }

    #[tokio::test]
    async fn pjl_preamble_is_skipped_but_kept_in_read_ahead() {
        let data: &[u8] = b"\x1b%-12345X@PJL\n@PJL SET USERNAME=\"john\"\n%!PS-Adobe-3.0\n\
                            %%For: (john)\n%%Title: (Doc 1)\n%%BeginProlog\n";
        let (outcome, _) = parse(data).await;
        let header = accepted(outcome);

        assert_eq!(header.title, "Doc 1");
        assert_eq!(header.user, "john");
        assert!(header.raw_header_bytes.starts_with(b"\x1b%-12345X@PJL\n@PJL SET"));
        assert!(header.header_lines.iter().all(|l| !l.starts_with("@PJL")));
        assert_eq!(header.header_lines[0], "%!PS-Adobe-3.0");
    }

    #[tokio::test]
    async fn pjl_preamble_with_crlf_line_ends() {
        let data = b"\x1b%-12345X@PJL\r\n@PJL JOB NAME = \"x\"\r\n@PJL ENTER LANGUAGE = POSTSCRIPT\r\n\
                     %!PS-Adobe-3.0\r\n%%Title: (x)\r\n%%For: (Jane)\r\n";
        let (outcome, _) = parse(data).await;
        let header = accepted(outcome);
        assert_eq!(header.title, "x");
        assert_eq!(header.user, "jane");
    }

    #[tokio::test]
    async fn garbage_is_not_postscript() {
        let (outcome, _) = parse(b"GARBAGE\n").await;
        assert_eq!(
            outcome,
            HeaderOutcome::Rejected(Rejection::NotPostScript {
                snippet: "GARBAGE".into()
            })
        );
    }

    #[tokio::test]
    async fn snippet_is_capped() {
        let (outcome, _) = parse(b"%PDF-1.7 binary follows\n").await;
        assert_eq!(
            outcome,
            HeaderOutcome::Rejected(Rejection::NotPostScript {
                snippet: "%PDF-1.7 b".into()
            })
        );
    }

    #[tokio::test]
    async fn pjl_preamble_without_postscript() {
        let (outcome, _) = parse(b"\x1b%-12345X@PJL\n@PJL ENTER LANGUAGE = PCL\n\x1bE").await;
        assert!(matches!(
            outcome,
            HeaderOutcome::Rejected(Rejection::NotPostScript { .. })
        ));

        let (outcome, _) = parse(b"\x1b%-12345X@PJL\n@PJL JOB\n").await;
        assert_eq!(
            outcome,
            HeaderOutcome::Rejected(Rejection::NotPostScript {
                snippet: String::new()
            })
        );
    }

    #[tokio::test]
    async fn missing_fields_before_prolog() {
        let (outcome, _) = parse(b"%!PS-Adobe-3.0\n%%BeginProlog\n").await;
        assert_eq!(
            outcome,
            HeaderOutcome::Rejected(Rejection::MissingHeaderFields {
                title: None,
                user: None
            })
        );
    }

    #[tokio::test]
    async fn missing_user_at_end_of_stream() {
        let (outcome, _) = parse(b"%!PS-Adobe-3.0\n%%Title: (Only title)\n").await;
        assert_eq!(
            outcome,
            HeaderOutcome::Rejected(Rejection::MissingHeaderFields {
                title: Some("Only title".into()),
                user: None
            })
        );
    }

    #[tokio::test]
    async fn header_limit_ends_an_endless_scan() {
        let mut data = b"%!PS-Adobe-3.0\n%%Title: (t)\n".to_vec();
        for _ in 0..10_000 {
            data.extend_from_slice(b"0 0 moveto 10 10 lineto stroke\n");
        }
        let mut reader = TeeLineReader::with_limit(data.as_slice(), Some(4096));
        let outcome = parse_header(&mut reader, &LowercaseUsers::default())
            .await
            .expect("in-memory read cannot fail");

        assert_eq!(
            outcome,
            HeaderOutcome::Rejected(Rejection::MissingHeaderFields {
                title: Some("t".into()),
                user: None
            })
        );
        assert!(reader.limit_reached());
        assert_eq!(reader.read_ahead().len(), 4096);
    }

    #[tokio::test]
    async fn header_limit_on_the_first_line_is_not_postscript() {
        let blob = vec![b'A'; 1024 * 1024];
        let mut reader = TeeLineReader::with_limit(blob.as_slice(), Some(4096));
        let outcome = parse_header(&mut reader, &LowercaseUsers::default())
            .await
            .expect("in-memory read cannot fail");

        assert_eq!(
            outcome,
            HeaderOutcome::Rejected(Rejection::NotPostScript {
                snippet: "AAAAAAAAAA".into()
            })
        );
        assert_eq!(reader.read_ahead().len(), 4096);
    }

    #[tokio::test]
    async fn fields_within_the_limit_are_accepted() {
        let data = b"%!PS-Adobe-3.0\n%%Title: (t)\n%%For: (u)\nshowpage\n";
        let mut reader = TeeLineReader::with_limit(&data[..], Some(64));
        let outcome = parse_header(&mut reader, &LowercaseUsers::default())
            .await
            .expect("in-memory read cannot fail");
        assert_eq!(accepted(outcome).user, "u");
    }

    #[tokio::test]
    async fn fields_after_prolog_are_ignored() {
        let (outcome, _) =
            parse(b"%!PS-Adobe-3.0\n%%Title: (t)\n%%BeginProlog\n%%For: (late)\n").await;
        assert!(matches!(
            outcome,
            HeaderOutcome::Rejected(Rejection::MissingHeaderFields { .. })
        ));
    }

    #[tokio::test]
    async fn empty_values_count_as_missing() {
        let (outcome, _) = parse(b"%!PS-Adobe-3.0\n%%Title: ()\n%%For: (bob)\n%%BeginProlog\n").await;
        assert!(matches!(
            outcome,
            HeaderOutcome::Rejected(Rejection::MissingHeaderFields { title: None, .. })
        ));
    }

    #[tokio::test]
    async fn scanning_stops_once_both_fields_are_known() {
        let (outcome, mut reader) =
            parse(b"%!PS-Adobe-3.0\n%%Title: (t)\n%%For: (u)\n%%Pages: 3\nshowpage\n").await;
        let header = accepted(outcome);
        assert_eq!(header.header_lines.len(), 3);

        use tokio::io::AsyncReadExt;
        let mut rest = Vec::new();
        reader.remaining().read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"%%Pages: 3\nshowpage\n");
    }

    #[tokio::test]
    async fn unparenthesised_windows_values() {
        let data = b"%!PS-Adobe-3.0\n%%Title: Test Page\n%%Creator: PScript5.dll Version 5.2.2\n\
                     %%For: Rijk Ravestein\n%%BeginProlog\n";
        let (outcome, _) = parse(data).await;
        let header = accepted(outcome);
        assert_eq!(header.title, "Test Page");
        assert_eq!(header.user, "rijk ravestein");
    }

    #[tokio::test]
    async fn utf8_title_survives_byte_for_byte() {
        let (outcome, _) = parse("%!PS-Adobe-3.0\n%%Title: (Übersicht – Q3)\n%%For: (rijk)\n".as_bytes()).await;
        assert_eq!(accepted(outcome).title, "Übersicht – Q3");
    }

    #[tokio::test]
    async fn empty_stream_is_a_probe() {
        let (outcome, reader) = parse(b"").await;
        assert_eq!(outcome, HeaderOutcome::Empty);
        assert!(reader.read_ahead().is_empty());
    }

    #[test]
    fn strip_parentheses_rules() {
        assert_eq!(strip_parentheses("(Report)"), "Report");
        assert_eq!(strip_parentheses("  (Report)  "), "Report");
        assert_eq!(strip_parentheses("Report"), "Report");
        assert_eq!(strip_parentheses("((nested))"), "(nested)");
        assert_eq!(strip_parentheses("(open"), "open");
        assert_eq!(strip_parentheses("()"), "");
    }

    #[test]
    fn rejection_carries_peer_into_error() {
        let peer: IpAddr = "192.0.2.4".parse().unwrap();
        let err = Rejection::NotPostScript {
            snippet: "GARBAGE".into(),
        }
        .into_error(peer);
        assert!(matches!(err, RawPrintError::NotPostScript { .. }));
        assert!(err.to_string().contains("[192.0.2.4]"));
    }
}
