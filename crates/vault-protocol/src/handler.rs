//! The protocol driver: one git request from handshake to completion.

use std::io::{ErrorKind, Read, Write};

use bstr::ByteSlice;
use tracing::debug;

use vault_hash::ObjectId;
use vault_repo::{
    merge_packfiles, RefUpdate, RepoError, Revision, RevisionStore, EMPTY_PACK_HEADER, HEAD,
};

use crate::negotiate::Negotiation;
use crate::pktline::{PktDecoder, PktEncoder};
use crate::sideband::{self, Band};
use crate::ProtocolError;

/// Capabilities advertised on fetch.
pub const PULL_CAPABILITIES: &str = "multi_ack_detailed side-band-64k thin-pack";

/// Capabilities advertised on push.
pub const PUSH_CAPABILITIES: &str = "delete-refs ofs-delta";

/// Default cap on a buffered push body.
pub const DEFAULT_MAX_PACK_BYTES: usize = 1 << 30;

/// The operation the client opened the connection for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitOperation {
    Pull,
    Push,
}

/// Serves one git request over a byte stream pair.
///
/// The handler owns the revision store for the lifetime of the request;
/// it loads the history once after the handshake and writes back only on
/// a successful push. Errors terminate the request without a descriptive
/// frame, and nothing written before the error is rolled back.
pub struct GitRequestHandler<R, W, S> {
    input: PktDecoder<R>,
    output: PktEncoder<W>,
    repo: S,
    max_pack_bytes: usize,
}

impl<R: Read, W: Write, S: RevisionStore> GitRequestHandler<R, W, S> {
    pub fn new(input: R, output: W, repo: S) -> Self {
        Self {
            input: PktDecoder::new(input),
            output: PktEncoder::new(output),
            repo,
            max_pack_bytes: DEFAULT_MAX_PACK_BYTES,
        }
    }

    /// Cap the buffered push body at `limit` bytes.
    pub fn with_max_pack_bytes(mut self, limit: usize) -> Self {
        self.max_pack_bytes = limit;
        self
    }

    /// Run the request to completion.
    pub fn serve(mut self) -> Result<(), ProtocolError> {
        let op = self.receive_handshake()?;
        debug!(?op, "handshake received");

        let revisions = self.repo.get_revisions()?;
        let current = revisions.last().cloned().unwrap_or_default();
        self.send_refs(&current, op)?;

        match op {
            GitOperation::Pull => self.serve_pull(&revisions),
            GitOperation::Push => self.serve_push(&current),
        }
    }

    fn serve_pull(&mut self, revisions: &[Revision]) -> Result<(), ProtocolError> {
        let wants = self.receive_pull_wants()?;
        if wants.is_empty() {
            debug!("client wants nothing");
            return Ok(());
        }

        let from = self.negotiate(revisions)?;
        let mut packs = Vec::with_capacity(revisions.len() - from);
        for index in from..revisions.len() {
            packs.push(self.repo.read_packfile(index)?);
        }
        let merged = merge_packfiles(&packs)?;
        debug!(
            from,
            packs = packs.len(),
            bytes = merged.len(),
            "sending merged packfile"
        );
        self.send_packfile(&merged)
    }

    fn serve_push(&mut self, current: &Revision) -> Result<(), ProtocolError> {
        let updates = self.receive_push_refs()?;
        if updates.is_empty() {
            debug!("client pushed no ref updates");
            return Ok(());
        }

        let next = current.with_updates(&updates);
        let mut pack = self.receive_packfile()?;
        if pack.is_empty() {
            // Ref-only pushes (new branch names, deletes) carry no body.
            pack.extend_from_slice(&EMPTY_PACK_HEADER);
        }
        debug!(
            updates = updates.len(),
            refs = next.len(),
            pack_bytes = pack.len(),
            "persisting pushed revision"
        );
        self.repo.save_new_revision(next, &pack)?;
        Ok(())
    }

    /// Read the opening request line: `git-<service> <repo>\0host=<host>`.
    /// Only the service prefix matters to the server.
    fn receive_handshake(&mut self) -> Result<GitOperation, ProtocolError> {
        let line = self
            .input
            .read_line()?
            .ok_or(ProtocolError::InvalidHandshake)?;

        if line.starts_with(b"git-upload-pack ") {
            Ok(GitOperation::Pull)
        } else if line.starts_with(b"git-receive-pack ") {
            Ok(GitOperation::Push)
        } else {
            Err(ProtocolError::InvalidHandshake)
        }
    }

    /// Advertise the refs of `current`, `HEAD` first with capabilities.
    fn send_refs(&mut self, current: &Revision, op: GitOperation) -> Result<(), ProtocolError> {
        if current.is_empty() {
            return self.output.write_flush();
        }

        let caps = match op {
            GitOperation::Pull => PULL_CAPABILITIES,
            GitOperation::Push => PUSH_CAPABILITIES,
        };
        let head = current.head().ok_or(ProtocolError::NoHead)?;
        self.output
            .write_line(format!("{head} {HEAD}\0{caps}").as_bytes())?;

        for (name, id) in current.iter() {
            if name == HEAD {
                continue;
            }
            self.output.write_line(format!("{id} {name}").as_bytes())?;
        }
        self.output.write_flush()
    }

    /// Collect `want` lines until the client's flush.
    fn receive_pull_wants(&mut self) -> Result<Vec<ObjectId>, ProtocolError> {
        let mut wants = Vec::new();
        while let Some(line) = self.input.read_line()? {
            wants.push(parse_oid_line(&line, b"want ").ok_or(ProtocolError::InvalidWant)?);
        }
        Ok(wants)
    }

    /// Run the have exchange; returns the first pack index to send.
    fn negotiate(&mut self, revisions: &[Revision]) -> Result<usize, ProtocolError> {
        let mut negotiation = Negotiation::new(revisions);
        loop {
            match self.input.read_line()? {
                None => {
                    if let Some(response) = negotiation.on_flush() {
                        self.output.write_line(response.to_line().as_bytes())?;
                    }
                }
                Some(line) if line.starts_with(b"done") => {
                    let response = negotiation.on_done();
                    self.output.write_line(response.to_line().as_bytes())?;
                    break;
                }
                Some(line) => {
                    let have =
                        parse_oid_line(&line, b"have ").ok_or(ProtocolError::InvalidHave)?;
                    if let Some(response) = negotiation.on_have(have) {
                        self.output.write_line(response.to_line().as_bytes())?;
                    }
                }
            }
        }
        Ok(negotiation.start_index())
    }

    /// Transmit the pack over sideband channel 1, then flush.
    fn send_packfile(&mut self, pack: &[u8]) -> Result<(), ProtocolError> {
        sideband::write_band(&mut self.output, Band::Data, pack)?;
        self.output.write_flush()
    }

    /// Collect `<old> <new> <name>` lines until the client's flush.
    fn receive_push_refs(&mut self) -> Result<Vec<RefUpdate>, ProtocolError> {
        let mut updates = Vec::new();
        while let Some(line) = self.input.read_line()? {
            updates.push(parse_push_ref(&line)?);
        }
        Ok(updates)
    }

    /// Buffer the raw remainder of the input as the pack body.
    fn receive_packfile(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let mut pack = Vec::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = match self.input.read_raw(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            if pack.len() + n > self.max_pack_bytes {
                return Err(RepoError::PackTooLarge {
                    size: pack.len() + n,
                    limit: self.max_pack_bytes,
                }
                .into());
            }
            pack.extend_from_slice(&buf[..n]);
        }
        Ok(pack)
    }
}

/// Parse a `want `/`have ` line: prefix, 40 hex chars, tolerated tail.
fn parse_oid_line(line: &[u8], prefix: &[u8]) -> Option<ObjectId> {
    let rest = line.strip_prefix(prefix)?;
    let hex = rest.get(..ObjectId::HEX_LEN)?;
    ObjectId::from_hex(hex.to_str().ok()?).ok()
}

/// Parse a push ref-update line.
///
/// The first line may carry a capability list after a NUL; everything
/// from the NUL on is dropped before splitting into the three fields.
/// The all-zeros id maps to `None` (create in `old`, delete in `new`).
fn parse_push_ref(line: &[u8]) -> Result<RefUpdate, ProtocolError> {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = match line.find_byte(0) {
        Some(nul) => &line[..nul],
        None => line,
    };

    let fields: Vec<&[u8]> = line.split_str(" ").collect();
    let [old, new, name] = fields[..] else {
        return Err(ProtocolError::InvalidPushRefs);
    };

    let name = name
        .trim()
        .to_str()
        .map_err(|_| ProtocolError::InvalidPushRefs)?;
    if name.is_empty() {
        return Err(ProtocolError::InvalidPushRefs);
    }

    Ok(RefUpdate {
        name: name.to_string(),
        old_id: parse_push_id(old)?,
        new_id: parse_push_id(new)?,
    })
}

fn parse_push_id(field: &[u8]) -> Result<Option<ObjectId>, ProtocolError> {
    let id = field
        .to_str()
        .ok()
        .and_then(|hex| ObjectId::from_hex(hex).ok())
        .ok_or(ProtocolError::InvalidPushRefs)?;
    Ok((!id.is_null()).then_some(id))
}
