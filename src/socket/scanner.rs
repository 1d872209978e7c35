use crate::addr::Domain;
use crate::error::{Error, ReadError};
use crate::poll::{Event, Readiness};

use super::stream::{RecvStep, StreamSocket, recv_step};

/// Incremental delimiter scanner over a stream socket's buffer.
///
/// Produced by [`StreamSocket::read_until`]. Each [`next_chunk`] call
/// returns the bytes up to the next occurrence of the pattern, refilling
/// the buffer from the socket under the configured timeout as needed. The
/// running prefix-match position survives across calls, so a delimiter
/// split between network reads is still found, and already-scanned bytes
/// are never revisited.
///
/// The matcher restarts at the pattern head on a mismatch without backing
/// up into bytes it has consumed; delimiters whose prefixes self-overlap
/// (such as `"aa"`) can miss occurrences that straddle the restart.
///
/// The scanner holds a mutable borrow of the socket, so a chunk in progress
/// must complete before the socket can be used for anything else.
///
/// [`next_chunk`]: ReadUntil::next_chunk
#[derive(Debug)]
pub struct ReadUntil<'a, D: Domain> {
    sock: &'a mut StreamSocket<D>,
    pattern: Vec<u8>,
    inclusive: bool,
    state: usize,
    done: bool,
}

impl<'a, D: Domain> ReadUntil<'a, D> {
    pub(crate) fn new(sock: &'a mut StreamSocket<D>, pattern: Vec<u8>, inclusive: bool) -> Self {
        Self {
            sock,
            pattern,
            inclusive,
            state: 0,
            done: false,
        }
    }

    /// Produces the next delimiter-bounded chunk.
    ///
    /// On timeout, peer close, or an OS error the accumulated, still
    /// unmatched bytes come back inside the [`ReadError`]; the scanner then
    /// yields `None` from its `Iterator` side.
    pub fn next_chunk(&mut self) -> Result<Vec<u8>, ReadError> {
        let trim = if self.inclusive {
            0
        } else {
            self.pattern.len()
        };
        let (handle, buf) = self.sock.parts();

        if handle.is_closed() {
            self.done = true;
            return Err(ReadError {
                partial: buf.take_all(),
                error: Error::Closed,
            });
        }
        let deadline = handle.deadline();

        loop {
            let (consumed, matched) = scan(&self.pattern, &mut self.state, buf.unread());
            buf.advance_read(consumed);
            if matched {
                self.state = 0;
                return Ok(buf.take_scanned(trim));
            }

            // Buffered data exhausted without a match: refill and resume
            // over the newly appended bytes only.
            match handle.wait(Event::Readable, &deadline) {
                Ok(Readiness::Ready) => {}
                Ok(Readiness::TimedOut) => {
                    self.done = true;
                    return Err(ReadError {
                        partial: buf.take_all(),
                        error: Error::Timeout,
                    });
                }
                Err(e) => {
                    self.done = true;
                    return Err(ReadError {
                        partial: buf.take_all(),
                        error: e,
                    });
                }
            }

            match recv_step(handle, buf) {
                Ok(RecvStep::Data) => {}
                Ok(RecvStep::Retry) => {}
                Ok(RecvStep::Eof) => {
                    self.done = true;
                    return Err(ReadError {
                        partial: buf.take_all(),
                        error: Error::Closed,
                    });
                }
                Err(e) => {
                    self.done = true;
                    return Err(ReadError {
                        partial: buf.take_all(),
                        error: e,
                    });
                }
            }
        }
    }
}

impl<D: Domain> Iterator for ReadUntil<'_, D> {
    type Item = Result<Vec<u8>, ReadError>;

    /// Yields chunks until a terminal error, then fuses to `None`.
    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        Some(self.next_chunk())
    }
}

/// Advances the prefix match over `pending`, returning how many bytes were
/// consumed and whether the full pattern completed.
///
/// On a mismatch with a nonzero prefix the same byte is retested at pattern
/// position zero; bytes consumed under the abandoned prefix are not
/// revisited.
fn scan(pattern: &[u8], state: &mut usize, pending: &[u8]) -> (usize, bool) {
    let mut i = 0;
    while i < pending.len() {
        if pending[i] == pattern[*state] {
            i += 1;
            *state += 1;
            if *state == pattern.len() {
                return (i, true);
            }
            continue;
        }

        if *state == 0 {
            i += 1;
            continue;
        }

        *state = 0;
    }
    (i, false)
}

#[cfg(test)]
mod tests {
    use super::scan;

    #[test]
    fn match_state_survives_a_chunk_boundary() {
        let mut state = 0;
        let (consumed, matched) = scan(b"\r\n", &mut state, b"GET / HTTP/1.1\r");
        assert_eq!((consumed, matched), (15, false));
        assert_eq!(state, 1);

        let (consumed, matched) = scan(b"\r\n", &mut state, b"\n rest");
        assert_eq!((consumed, matched), (1, true));
    }

    #[test]
    fn mismatch_retests_the_same_byte_at_the_head() {
        let mut state = 0;
        // "aab" against "ab": the second 'a' fails at position 1, restarts,
        // and still opens the match that completes with 'b'.
        let (consumed, matched) = scan(b"ab", &mut state, b"aab");
        assert_eq!((consumed, matched), (3, true));
    }

    #[test]
    fn restart_does_not_revisit_consumed_bytes() {
        let mut state = 0;
        // "aaab" holds "aab" starting at offset 1, but the bytes consumed
        // under the abandoned prefix are gone: no match is reported.
        let (consumed, matched) = scan(b"aab", &mut state, b"aaab");
        assert_eq!((consumed, matched), (4, false));
        assert_eq!(state, 0);
    }

    #[test]
    fn immediate_delimiter_yields_empty_chunk_region() {
        let mut state = 0;
        let (consumed, matched) = scan(b"\n", &mut state, b"\nrest");
        assert_eq!((consumed, matched), (1, true));
    }

    #[test]
    fn plain_bytes_are_consumed_without_state() {
        let mut state = 0;
        let (consumed, matched) = scan(b"\r\n", &mut state, b"no delimiter here");
        assert_eq!((consumed, matched), (17, false));
        assert_eq!(state, 0);
    }
}
