//! End-to-end driver tests: scripted client bytes in, server bytes out.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use vault_hash::{sha1_digest, ObjectId};
use vault_protocol::pktline::{PktDecoder, PktEncoder};
use vault_protocol::{GitRequestHandler, ProtocolError};
use vault_repo::{
    JsonRevisionLog, RepoError, Revision, RevisionStore, EMPTY_PACK_HEADER, PACK_SIGNATURE,
    PACK_VERSION,
};
use vault_store::{BlobStore, MemoryStore, SecretboxStore};

/// Head of the first fixture revision.
const REV_0_ID: &str = "f84b0d7375bcb16dd2742344e6af173aeebfcfd6";
/// Head of the second fixture revision.
const REV_1_ID: &str = "1a6d946069d483225913cf3b8ba8eae4c894c322";

/// Incremental packs captured from a real repository; `PACK_1` builds on
/// `PACK_0`. Three objects each.
const PACK_0: &str = "UEFDSwAAAAIAAAADlwt4nJ3MQQrCMBBA0X1OMXtBJk7SdEBEcOslJmGCgaSFdnp/ET2By7f43zZVmAS5RC46a/Y55lBnDhE9kk6pVs4klL2ok8Ne6wbPo8gOj65DF1O49o/v5edzW2/gAxEnShzghBdEV9Yxmpn+V7u2NGvS4btxb5cEOSI0eJxLSiziAgADnQFArwF4nDM0MDAzMVFIy89nCBc7Fdl++mdt9lZPhX3L1t5T0W1/BgCtgg0ijmEEgEsIHYPJopDmNYTk3nR5stM=";
const PACK_1: &str = "UEFDSwAAAAIAAAADlgx4nJXLSwrCMBRG4XlWkbkgSe5NbgpS3Eoef1QwtrQRXL51CU7O4MA3NkDnmqgFT0CSBhIGI0RhmeBCCb5Mk2cbWa1pw2voFjmbKiQ+l2xDrU7YER8oNSuUgNxKq0Gl97gvmx7Yh778esUn9fWJc1n6rC0TG0suOn0yzhh13P4YA38Q1feb+gIlsDr0M3icS0qsAgACZQE+rwF4nDM0MDAzMVFIy89nsJ9qkZYUaGwfv1Tygdym9MuFp+ZUAACUGAuBskz7fFz81Do1iG8hcUrj/ncK63Q=";

fn pack_0() -> Vec<u8> {
    STANDARD.decode(PACK_0).unwrap()
}

fn pack_1() -> Vec<u8> {
    STANDARD.decode(PACK_1).unwrap()
}

fn oid(hex: &str) -> ObjectId {
    ObjectId::from_hex(hex).unwrap()
}

fn rev(pairs: &[(&str, &str)]) -> Revision {
    pairs
        .iter()
        .map(|(name, hex)| (name.to_string(), oid(hex)))
        .collect()
}

/// A scripted client frame: data, or a flush.
enum Frame<'a> {
    Data(&'a [u8]),
    Flush,
}

/// Encode the client's side of the exchange, appending `raw_tail` after
/// the framed section (the push pack body arrives unframed).
fn client_bytes(frames: &[Frame<'_>], raw_tail: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut encoder = PktEncoder::new(&mut buf);
        for frame in frames {
            match frame {
                Frame::Data(data) => encoder.write_line(data).unwrap(),
                Frame::Flush => encoder.write_flush().unwrap(),
            }
        }
    }
    buf.extend_from_slice(raw_tail);
    buf
}

/// Decode the server's output into frames; flushes decode as `None`.
fn server_frames(buf: &[u8]) -> Vec<Option<Vec<u8>>> {
    let mut decoder = PktDecoder::new(Cursor::new(buf));
    let mut frames = Vec::new();
    loop {
        let consumed = decoder.into_inner();
        if consumed.position() as usize == buf.len() {
            return frames;
        }
        decoder = PktDecoder::new(consumed);
        frames.push(decoder.read_line().unwrap());
    }
}

/// Reassemble band-1 sideband payloads from a run of frames.
fn sideband_payload(frames: &[Option<Vec<u8>>]) -> Vec<u8> {
    let mut payload = Vec::new();
    for frame in frames {
        let frame = frame.as_ref().expect("sideband run ended by flush");
        assert_eq!(frame[0], 1, "only band 1 is ever emitted");
        payload.extend_from_slice(&frame[1..]);
    }
    payload
}

fn serve(
    store: &MemoryStore,
    frames: &[Frame<'_>],
    raw_tail: &[u8],
) -> Result<Vec<Option<Vec<u8>>>, ProtocolError> {
    let input = client_bytes(frames, raw_tail);
    let mut output = Vec::new();
    let result = GitRequestHandler::new(
        Cursor::new(input),
        &mut output,
        JsonRevisionLog::new(store),
    )
    .serve();
    result.map(|()| server_frames(&output))
}

/// Seed a store with the fixture history, one or two revisions deep.
fn seed_history(store: &MemoryStore, revisions: usize) {
    let mut log = JsonRevisionLog::new(store);
    log.save_new_revision(
        rev(&[("HEAD", REV_0_ID), ("refs/heads/master", REV_0_ID)]),
        &pack_0(),
    )
    .unwrap();
    if revisions > 1 {
        log.save_new_revision(
            rev(&[("HEAD", REV_1_ID), ("refs/heads/master", REV_1_ID)]),
            &pack_1(),
        )
        .unwrap();
    }
}

#[test]
fn clone_from_empty_repository() {
    let store = MemoryStore::new();
    let frames = serve(
        &store,
        &[
            Frame::Data(b"git-upload-pack repo\0host=h"),
            Frame::Flush,
        ],
        b"",
    )
    .unwrap();

    // An empty history advertises exactly one flush and nothing follows.
    assert_eq!(frames, vec![None]);
}

#[test]
fn clone_with_one_revision() {
    let store = MemoryStore::new();
    seed_history(&store, 1);

    let want = format!("want {REV_0_ID}");
    let frames = serve(
        &store,
        &[
            Frame::Data(b"git-upload-pack repo\0host=h"),
            Frame::Data(want.as_bytes()),
            Frame::Flush,
            Frame::Data(b"done"),
        ],
        b"",
    )
    .unwrap();

    let head_line = format!("{REV_0_ID} HEAD\0multi_ack_detailed side-band-64k thin-pack");
    let master_line = format!("{REV_0_ID} refs/heads/master");
    assert_eq!(frames[0].as_deref(), Some(head_line.as_bytes()));
    assert_eq!(frames[1].as_deref(), Some(master_line.as_bytes()));
    assert_eq!(frames[2], None);
    assert_eq!(frames[3].as_deref(), Some(&b"NAK"[..]));

    // Everything between the NAK and the final flush is band-1 pack data;
    // a single well-formed pack merges to itself.
    assert_eq!(frames.last(), Some(&None));
    let pack = sideband_payload(&frames[4..frames.len() - 1]);
    assert_eq!(pack, pack_0());
}

#[test]
fn incremental_pull_sends_only_new_packs() {
    let store = MemoryStore::new();
    seed_history(&store, 2);

    let want = format!("want {REV_1_ID}");
    let have = format!("have {REV_0_ID}");
    let frames = serve(
        &store,
        &[
            Frame::Data(b"git-upload-pack repo\0host=h"),
            Frame::Data(want.as_bytes()),
            Frame::Flush,
            Frame::Data(have.as_bytes()),
            Frame::Flush,
            Frame::Data(b"done\n"),
        ],
        b"",
    )
    .unwrap();

    // Advertisement: HEAD, master, flush.
    assert_eq!(frames[2], None);

    // The have covers revision 0, so the range is decided immediately;
    // the interleaved flush draws no NAK once the result is chosen.
    let ready = format!("ACK {REV_0_ID} ready");
    let closing = format!("ACK {REV_0_ID}");
    assert_eq!(frames[3].as_deref(), Some(ready.as_bytes()));
    assert_eq!(frames[4].as_deref(), Some(closing.as_bytes()));

    let pack = sideband_payload(&frames[5..frames.len() - 1]);
    assert_eq!(pack, pack_1());
}

#[test]
fn multi_want_partial_overlap() {
    const A1: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa1";
    const A2: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa2";
    const B1: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb1";
    const B2: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb2";

    let store = MemoryStore::new();
    let mut log = JsonRevisionLog::new(&store);
    log.save_new_revision(
        rev(&[("HEAD", B1), ("refs/heads/master", B1)]),
        &make_pack(1, b"base"),
    )
    .unwrap();
    log.save_new_revision(
        rev(&[
            ("HEAD", B2),
            ("refs/heads/master", B2),
            ("refs/heads/topic", A1),
        ]),
        &make_pack(2, b"increment"),
    )
    .unwrap();

    let wants = [format!("want {A2}"), format!("want {B2}")];
    let haves = [format!("have {A1}"), format!("have {B1}")];
    let frames = serve(
        &store,
        &[
            Frame::Data(b"git-upload-pack repo\0host=h"),
            Frame::Data(wants[0].as_bytes()),
            Frame::Data(wants[1].as_bytes()),
            Frame::Flush,
            Frame::Data(haves[0].as_bytes()),
            Frame::Data(haves[1].as_bytes()),
            Frame::Data(b"done"),
        ],
        b"",
    )
    .unwrap();

    // Advertisement is HEAD + 2 refs + flush; negotiation starts after.
    assert_eq!(frames[3], None);
    assert_eq!(frames[4].as_deref(), Some(format!("ACK {A1} common").as_bytes()));
    assert_eq!(frames[5].as_deref(), Some(format!("ACK {B1} ready").as_bytes()));
    assert_eq!(frames[6].as_deref(), Some(format!("ACK {B1}").as_bytes()));

    // Revision 0 was covered; only the second pack is sent.
    let pack = sideband_payload(&frames[7..frames.len() - 1]);
    assert_eq!(pack, make_pack(2, b"increment"));
}

#[test]
fn pull_with_no_wants_sends_nothing() {
    let store = MemoryStore::new();
    seed_history(&store, 1);

    let frames = serve(
        &store,
        &[
            Frame::Data(b"git-upload-pack repo\0host=h"),
            Frame::Flush,
        ],
        b"",
    )
    .unwrap();

    // Advertisement only: HEAD line, master line, flush. No pack bytes.
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[2], None);
}

#[test]
fn fully_up_to_date_client_gets_empty_pack() {
    let store = MemoryStore::new();
    seed_history(&store, 2);

    let want = format!("want {REV_1_ID}");
    let have = format!("have {REV_1_ID}");
    let frames = serve(
        &store,
        &[
            Frame::Data(b"git-upload-pack repo\0host=h"),
            Frame::Data(want.as_bytes()),
            Frame::Flush,
            Frame::Data(have.as_bytes()),
            Frame::Data(b"done"),
        ],
        b"",
    )
    .unwrap();

    let pack = sideband_payload(&frames[5..frames.len() - 1]);
    assert_eq!(&pack[..12], &EMPTY_PACK_HEADER);
    assert_eq!(pack.len(), 32);
    let (prefix, trailer) = pack.split_at(12);
    assert_eq!(sha1_digest(prefix).as_bytes(), trailer);
}

#[test]
fn push_new_commit_appends_revision() {
    let store = MemoryStore::new();
    seed_history(&store, 1);

    let update = format!("{REV_0_ID} {REV_1_ID} refs/heads/master\0report-status");
    let frames = serve(
        &store,
        &[
            Frame::Data(b"git-receive-pack repo\0host=h"),
            Frame::Data(update.as_bytes()),
            Frame::Flush,
        ],
        &pack_1(),
    )
    .unwrap();

    let head_line = format!("{REV_0_ID} HEAD\0delete-refs ofs-delta");
    assert_eq!(frames[0].as_deref(), Some(head_line.as_bytes()));
    assert_eq!(frames[2], None);

    let log = JsonRevisionLog::new(&store);
    let revisions = log.get_revisions().unwrap();
    assert_eq!(revisions.len(), 2);
    assert_eq!(
        revisions[1],
        rev(&[("HEAD", REV_1_ID), ("refs/heads/master", REV_1_ID)])
    );
    assert_eq!(log.read_packfile(1).unwrap(), pack_1());
}

#[test]
fn push_delete_removes_ref_and_keeps_head() {
    const FOOBAR: &str = "226b4f2fd9f8ca09f9abe37612c06fe4527694f5";

    let store = MemoryStore::new();
    let mut log = JsonRevisionLog::new(&store);
    log.save_new_revision(
        rev(&[
            ("HEAD", REV_0_ID),
            ("refs/heads/master", REV_0_ID),
            ("refs/heads/foobar", FOOBAR),
        ]),
        &pack_0(),
    )
    .unwrap();

    let update = format!("{FOOBAR} 0000000000000000000000000000000000000000 refs/heads/foobar");
    serve(
        &store,
        &[
            Frame::Data(b"git-receive-pack repo\0host=h"),
            Frame::Data(update.as_bytes()),
            Frame::Flush,
        ],
        b"",
    )
    .unwrap();

    let revisions = JsonRevisionLog::new(&store).get_revisions().unwrap();
    assert_eq!(revisions.len(), 2);
    assert_eq!(
        revisions[1],
        rev(&[("HEAD", REV_0_ID), ("refs/heads/master", REV_0_ID)])
    );

    // A ref-only push has no body; the canonical empty pack is persisted.
    let log = JsonRevisionLog::new(&store);
    assert_eq!(log.read_packfile(1).unwrap(), EMPTY_PACK_HEADER);
}

#[test]
fn push_into_empty_repository() {
    let store = MemoryStore::new();

    let update =
        format!("0000000000000000000000000000000000000000 {REV_0_ID} refs/heads/master");
    let frames = serve(
        &store,
        &[
            Frame::Data(b"git-receive-pack repo\0host=h"),
            Frame::Data(update.as_bytes()),
            Frame::Flush,
        ],
        &pack_0(),
    )
    .unwrap();

    // Empty history advertises a bare flush even on push.
    assert_eq!(frames[0], None);

    let revisions = JsonRevisionLog::new(&store).get_revisions().unwrap();
    assert_eq!(revisions.len(), 1);
    assert_eq!(
        revisions[0],
        rev(&[("HEAD", REV_0_ID), ("refs/heads/master", REV_0_ID)])
    );
}

#[test]
fn push_with_no_updates_writes_nothing() {
    let store = MemoryStore::new();
    seed_history(&store, 1);
    let names_before = store.names();

    serve(
        &store,
        &[
            Frame::Data(b"git-receive-pack repo\0host=h"),
            Frame::Flush,
        ],
        b"",
    )
    .unwrap();

    assert_eq!(store.names(), names_before);
}

#[test]
fn oversized_push_body_is_rejected() {
    let store = MemoryStore::new();
    seed_history(&store, 1);

    let update = format!("{REV_0_ID} {REV_1_ID} refs/heads/master");
    let input = client_bytes(
        &[
            Frame::Data(b"git-receive-pack repo\0host=h"),
            Frame::Data(update.as_bytes()),
            Frame::Flush,
        ],
        &vec![0u8; 4096],
    );

    let err = GitRequestHandler::new(
        Cursor::new(input),
        Vec::new(),
        JsonRevisionLog::new(&store),
    )
    .with_max_pack_bytes(1024)
    .serve()
    .unwrap_err();

    assert!(matches!(
        err,
        ProtocolError::Repo(RepoError::PackTooLarge { .. })
    ));
    // Nothing was persisted.
    assert_eq!(JsonRevisionLog::new(&store).get_revisions().unwrap().len(), 1);
}

#[test]
fn invalid_handshake_terminates() {
    let store = MemoryStore::new();
    let err = serve(&store, &[Frame::Data(b"git-annex repo\0host=h")], b"").unwrap_err();
    assert!(matches!(err, ProtocolError::InvalidHandshake));
}

#[test]
fn invalid_want_line_terminates() {
    let store = MemoryStore::new();
    seed_history(&store, 1);
    let err = serve(
        &store,
        &[
            Frame::Data(b"git-upload-pack repo\0host=h"),
            Frame::Data(b"want deadbeef"),
            Frame::Flush,
        ],
        b"",
    )
    .unwrap_err();
    assert!(matches!(err, ProtocolError::InvalidWant));
}

#[test]
fn invalid_have_line_terminates() {
    let store = MemoryStore::new();
    seed_history(&store, 1);
    let want = format!("want {REV_0_ID}");
    let err = serve(
        &store,
        &[
            Frame::Data(b"git-upload-pack repo\0host=h"),
            Frame::Data(want.as_bytes()),
            Frame::Flush,
            Frame::Data(b"gimme everything"),
        ],
        b"",
    )
    .unwrap_err();
    assert!(matches!(err, ProtocolError::InvalidHave));
}

#[test]
fn missing_head_is_an_error() {
    let store = MemoryStore::new();
    let mut log = JsonRevisionLog::new(&store);
    log.save_new_revision(
        rev(&[("refs/heads/master", REV_0_ID)]),
        &pack_0(),
    )
    .unwrap();

    let err = serve(
        &store,
        &[Frame::Data(b"git-upload-pack repo\0host=h"), Frame::Flush],
        b"",
    )
    .unwrap_err();
    assert!(matches!(err, ProtocolError::NoHead));
}

#[test]
fn push_then_clone_over_encrypted_store() {
    let blobs = MemoryStore::new();
    let key = [3u8; 32];

    // Push into an empty encrypted repository.
    let update =
        format!("0000000000000000000000000000000000000000 {REV_0_ID} refs/heads/master\0report-status");
    let input = client_bytes(
        &[
            Frame::Data(b"git-receive-pack repo\0host=h"),
            Frame::Data(update.as_bytes()),
            Frame::Flush,
        ],
        &pack_0(),
    );
    GitRequestHandler::new(
        Cursor::new(input),
        Vec::new(),
        JsonRevisionLog::new(SecretboxStore::new(&blobs, key)),
    )
    .serve()
    .unwrap();

    // Only ciphertext blobs hit the backing store.
    assert_eq!(blobs.names(), vec!["0.pack.nacl", "revisions.json.nacl"]);
    assert!(!blobs
        .read("revisions.json.nacl")
        .unwrap()
        .windows(b"refs/heads/master".len())
        .any(|w| w == b"refs/heads/master"));

    // Clone back through a fresh handler with the same key.
    let want = format!("want {REV_0_ID}");
    let input = client_bytes(
        &[
            Frame::Data(b"git-upload-pack repo\0host=h"),
            Frame::Data(want.as_bytes()),
            Frame::Flush,
            Frame::Data(b"done"),
        ],
        b"",
    );
    let mut output = Vec::new();
    GitRequestHandler::new(
        Cursor::new(input),
        &mut output,
        JsonRevisionLog::new(SecretboxStore::new(&blobs, key)),
    )
    .serve()
    .unwrap();

    let frames = server_frames(&output);
    let pack = sideband_payload(&frames[4..frames.len() - 1]);
    assert_eq!(pack, pack_0());
}

/// Fabricate a structurally valid pack for merge-range assertions.
fn make_pack(count: u32, body: &[u8]) -> Vec<u8> {
    let mut pack = Vec::new();
    pack.extend_from_slice(PACK_SIGNATURE);
    pack.extend_from_slice(&PACK_VERSION.to_be_bytes());
    pack.extend_from_slice(&count.to_be_bytes());
    pack.extend_from_slice(body);
    let trailer = sha1_digest(&pack);
    pack.extend_from_slice(trailer.as_bytes());
    pack
}
