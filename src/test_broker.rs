//! Loopback MQTT 3.1.1 broker pieces for tests: frame splitting and scripted replies.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub(crate) const CONNECT: u8 = 0x10;
pub(crate) const SUBSCRIBE: u8 = 0x82;
pub(crate) const PUBREL: u8 = 0x62;
pub(crate) const DISCONNECT: u8 = 0xE0;

pub(crate) const CONNACK_ACCEPTED: [u8; 4] = [0x20, 0x02, 0x00, 0x00];

pub(crate) enum Reply {
    Send(Vec<u8>),
    SendAndClose(Vec<u8>),
}

/// Removes one complete (fixed header byte, body) frame from the front of `buf`.
pub(crate) fn take_frame(buf: &mut Vec<u8>) -> Option<(u8, Vec<u8>)> {
    let (mut len, mut multiplier, mut i) = (0usize, 1usize, 1usize);
    loop {
        let byte = *buf.get(i)?;
        len += (byte & 0x7f) as usize * multiplier;
        multiplier *= 128;
        i += 1;
        if byte & 0x80 == 0 {
            break;
        }
    }
    if buf.len() < i + len {
        return None;
    }
    let header = buf[0];
    let body = buf[i..i + len].to_vec();
    buf.drain(..i + len);
    Some((header, body))
}

/// Answers every frame the client sends with `reply` and records it, until EOF or a close.
pub(crate) async fn serve<F>(socket: &mut TcpStream, mut reply: F) -> Vec<(u8, Vec<u8>)>
where
    F: FnMut(u8, &[u8]) -> Reply,
{
    let mut frames = Vec::new();
    let mut pending = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            return frames;
        }
        pending.extend_from_slice(&chunk[..n]);
        while let Some((header, body)) = take_frame(&mut pending) {
            let answer = reply(header, &body);
            frames.push((header, body));
            match answer {
                Reply::Send(bytes) => {
                    if !bytes.is_empty() {
                        let _ = socket.write_all(&bytes).await;
                    }
                }
                Reply::SendAndClose(bytes) => {
                    let _ = socket.write_all(&bytes).await;
                    return frames;
                }
            }
        }
    }
}

/// Topic and payload of a PUBLISH body, plus its packet id for QoS 1 and 2.
pub(crate) fn publish_parts(header: u8, body: &[u8]) -> (String, Option<u16>, Vec<u8>) {
    let topic_len = u16::from_be_bytes([body[0], body[1]]) as usize;
    let topic = String::from_utf8_lossy(&body[2..2 + topic_len]).to_string();
    let mut rest = 2 + topic_len;
    let pkid = if (header >> 1) & 0x03 > 0 {
        let id = u16::from_be_bytes([body[rest], body[rest + 1]]);
        rest += 2;
        Some(id)
    } else {
        None
    };
    (topic, pkid, body[rest..].to_vec())
}

/// Packet id and (topic, requested QoS) pairs of a SUBSCRIBE body.
pub(crate) fn subscribe_parts(body: &[u8]) -> (u16, Vec<(String, u8)>) {
    let pkid = u16::from_be_bytes([body[0], body[1]]);
    let mut filters = Vec::new();
    let mut i = 2;
    while i < body.len() {
        let len = u16::from_be_bytes([body[i], body[i + 1]]) as usize;
        let topic = String::from_utf8_lossy(&body[i + 2..i + 2 + len]).to_string();
        filters.push((topic, body[i + 2 + len]));
        i += 3 + len;
    }
    (pkid, filters)
}

fn ack(kind: u8, pkid: u16) -> Vec<u8> {
    let [hi, lo] = pkid.to_be_bytes();
    vec![kind, 0x02, hi, lo]
}

/// Broker behaviour for publishers: accepts CONNECT and completes every QoS handshake.
pub(crate) fn acknowledge_publishes(header: u8, body: &[u8]) -> Reply {
    match header {
        CONNECT => Reply::Send(CONNACK_ACCEPTED.to_vec()),
        PUBREL => Reply::Send(ack(0x70, u16::from_be_bytes([body[0], body[1]]))),
        h if h & 0xF0 == 0x30 => match (publish_parts(h, body).1, (h >> 1) & 0x03) {
            (Some(pkid), 1) => Reply::Send(ack(0x40, pkid)),
            (Some(pkid), _) => Reply::Send(ack(0x50, pkid)),
            (None, _) => Reply::Send(Vec::new()),
        },
        _ => Reply::Send(Vec::new()),
    }
}

/// SUBACK rejecting every filter of the SUBSCRIBE `pkid`.
pub(crate) fn suback_rejecting(pkid: u16, filters: usize) -> Vec<u8> {
    let [hi, lo] = pkid.to_be_bytes();
    let mut packet = vec![0x90, (2 + filters) as u8, hi, lo];
    packet.extend(std::iter::repeat(0x80).take(filters));
    packet
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_taken_only_when_complete() {
        let mut buf = vec![0x30, 0x05, 0x00, 0x01, b'a'];
        assert!(take_frame(&mut buf).is_none());

        buf.extend_from_slice(&[b'h', b'i', 0xE0, 0x00]);
        let (header, body) = take_frame(&mut buf).unwrap();
        assert_eq!(header, 0x30);
        assert_eq!(publish_parts(header, &body), ("a".to_string(), None, b"hi".to_vec()));
        assert_eq!(take_frame(&mut buf), Some((DISCONNECT, Vec::new())));
        assert!(buf.is_empty());
    }

    #[test]
    fn subscribe_body_lists_every_filter() {
        let body = [0x00, 0x07, 0x00, 0x01, b'a', 0x01, 0x00, 0x02, b'b', b'c', 0x02];
        assert_eq!(
            subscribe_parts(&body),
            (7, vec![("a".to_string(), 1), ("bc".to_string(), 2)])
        );
        assert_eq!(suback_rejecting(7, 2), vec![0x90, 0x04, 0x00, 0x07, 0x80, 0x80]);
    }
}
