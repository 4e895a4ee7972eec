use bytes::Bytes;
use util::marshal::{Marshal, Unmarshal};

use super::*;
use crate::algorithm::OID_AES128;

/// A fixed shared secret standing in for the Diffie-Hellman exchange.
struct StaticSecret(Vec<u8>);

impl KeyAgreement for StaticSecret {
    fn compute_shared_secret(&self) -> Result<Vec<u8>> {
        Ok(self.0.clone())
    }
}

fn secret() -> StaticSecret {
    StaticSecret((0..96).map(|i| i as u8).collect())
}

fn session_pair() -> Result<(Session, Session)> {
    let dh = secret();
    let mut master = Session::new(OID_AES128);
    let mut slave = Session::new(OID_AES128);
    master.create(true, &dh)?;
    slave.create(false, &dh)?;

    let wrapped = master.encode_media_key()?;
    slave.decode_media_key(&wrapped)?;
    Ok((master, slave))
}

fn packet(payload: &[u8]) -> rtp::packet::Packet {
    rtp::packet::Packet {
        header: rtp::header::Header {
            sequence_number: 5000,
            timestamp: 10000,
            payload_type: 96,
            marker: true,
            ..Default::default()
        },
        payload: Bytes::copy_from_slice(payload),
    }
}

#[test]
fn test_session_setup() -> Result<()> {
    let dh = secret();
    let mut session = Session::new(OID_AES128);
    assert!(!session.is_ready());

    session.create(true, &dh)?;
    assert!(session.is_ready());
    assert!(session.is_master());

    assert_eq!(
        session.create(true, &dh),
        Err(Error::SessionAlreadyInitialised)
    );
    Ok(())
}

#[test]
fn test_media_key_wrap_length() -> Result<()> {
    let dh = secret();
    let mut master = Session::new(OID_AES128);
    master.create(true, &dh)?;

    let wrapped = master.encode_media_key()?;
    assert_eq!(wrapped.len(), 16, "an AES-128 key wraps to one block");
    Ok(())
}

#[test]
fn test_frame_round_trip() -> Result<()> {
    let (mut master, mut slave) = session_pair()?;

    let payload: Vec<u8> = (0..23).collect();
    let mut frame = packet(&payload);
    master.write_frame(&mut frame)?;
    assert_ne!(&frame.payload[..], &payload[..]);
    assert!(frame.header.padding, "23 bytes encrypt with padding");

    slave.read_frame(&mut frame)?;
    assert_eq!(&frame.payload[..], &payload[..]);
    assert!(!frame.header.padding);
    Ok(())
}

#[test]
fn test_aligned_frame_keeps_its_size() -> Result<()> {
    let (mut master, mut slave) = session_pair()?;

    let payload = [0x24u8; 160]; // one 20ms G.711 frame
    let mut frame = packet(&payload);
    master.write_frame(&mut frame)?;
    assert_eq!(frame.payload.len(), 160);
    assert!(!frame.header.padding);

    slave.read_frame(&mut frame)?;
    assert_eq!(&frame.payload[..], &payload[..]);
    Ok(())
}

#[test]
fn test_sequence_number_feeds_the_iv() -> Result<()> {
    let (mut master, _) = session_pair()?;

    let payload = [0x24u8; 32];
    let mut first = packet(&payload);
    let mut second = packet(&payload);
    second.header.sequence_number += 1;

    master.write_frame(&mut first)?;
    master.write_frame(&mut second)?;
    assert_ne!(
        first.payload, second.payload,
        "per-packet IVs must differ with the sequence number"
    );
    Ok(())
}

#[test]
fn test_in_place_round_trip() -> Result<()> {
    let (mut master, mut slave) = session_pair()?;

    let payload: Vec<u8> = (0..100).collect();
    let mut frame = packet(&payload).marshal()?.to_vec();
    let header_len = frame.len() - payload.len();

    master.write_frame_in_place(&mut frame)?;
    assert_eq!(frame.len(), header_len + 112, "100 bytes pad to 112");
    assert_ne!(&frame[header_len..header_len + 100], &payload[..]);

    slave.read_frame_in_place(&mut frame)?;
    let decrypted = rtp::packet::Packet::unmarshal(&mut &frame[..])?;
    assert_eq!(&decrypted.payload[..], &payload[..]);
    assert!(!decrypted.header.padding);
    Ok(())
}

#[test]
fn test_in_place_read_drops_bad_frames() -> Result<()> {
    let (mut master, mut slave) = session_pair()?;

    let payload: Vec<u8> = (0..23).collect();
    let mut frame = packet(&payload).marshal()?.to_vec();
    let header_len = frame.len() - payload.len();

    master.write_frame_in_place(&mut frame)?;
    // a truncated ciphertext cannot carry valid padding
    frame.truncate(frame.len() - 1);

    slave.read_frame_in_place(&mut frame)?;
    assert_eq!(frame.len(), header_len, "payload is discarded, not fatal");
    Ok(())
}

#[test]
fn test_kek_uses_the_secret_tail() -> Result<()> {
    // secrets that differ only in their leading bytes derive the same KEK
    let mut long = StaticSecret((0..96).map(|i| i as u8).collect());
    long.0[0] ^= 0xff;

    let mut master = Session::new(OID_AES128);
    let mut slave = Session::new(OID_AES128);
    master.create(true, &secret())?;
    slave.create(false, &long)?;

    let wrapped = master.encode_media_key()?;
    slave.decode_media_key(&wrapped)?;

    let payload = [7u8; 32];
    let mut frame = packet(&payload);
    master.write_frame(&mut frame)?;
    slave.read_frame(&mut frame)?;
    assert_eq!(&frame.payload[..], &payload[..]);
    Ok(())
}

#[test]
fn test_short_shared_secret() {
    let dh = StaticSecret(vec![0u8; 8]);
    let mut session = Session::new(OID_AES128);
    assert_eq!(
        session.create(true, &dh),
        Err(Error::ShortSharedSecret(16, 8))
    );
}

#[test]
fn test_media_key_before_setup() {
    let mut session = Session::new(OID_AES128);
    assert_eq!(
        session.decode_media_key(&[0u8; 16]),
        Err(Error::SessionNotInitialised)
    );
}

#[test]
fn test_unsupported_algorithm_session() {
    let mut session = Session::new("1.3.6.1.4.1.0.0");
    let result = session.create(true, &secret());
    assert_eq!(
        result,
        Err(Error::UnsupportedAlgorithm("1.3.6.1.4.1.0.0".to_owned()))
    );
}

#[cfg(feature = "aes256")]
#[test]
fn test_large_key_media_wrap() -> Result<()> {
    use crate::algorithm::OID_AES256;

    let dh = secret();
    let mut master = Session::new(OID_AES256);
    let mut slave = Session::new(OID_AES256);
    master.create(true, &dh)?;
    slave.create(false, &dh)?;

    let wrapped = master.encode_media_key()?;
    assert_eq!(wrapped.len(), 32, "a 32-byte key wraps without padding");
    slave.decode_media_key(&wrapped)?;

    let payload = [3u8; 48];
    let mut frame = packet(&payload);
    master.write_frame(&mut frame)?;
    slave.read_frame(&mut frame)?;
    assert_eq!(&frame.payload[..], &payload[..]);
    Ok(())
}
