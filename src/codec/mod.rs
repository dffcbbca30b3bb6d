
use serde::{ Serialize, Deserialize, de::DeserializeOwned };
use serde_json::Value;

use std::net::TcpStream;
use std::io::{ self, BufReader, BufWriter, Read, Write };
use std::sync::Mutex;

use crate::error::{ Error, Fault };

pub const MAGIC_NUMBER: i32 = 0x37373737;

/// Upper bound for one frame; larger length prefixes are treated as corrupt.
pub const MAX_FRAME_LEN: u64 = 64 * 1024 * 1024;

#[derive(Serialize, Deserialize, Debug)]
pub struct Message {
  pub magic_number: i32,
}

impl Message {
  pub fn new(magic_number: i32) -> Self {
    Message { magic_number }
  }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Header {
  pub channel: String,
  pub method: String,
  pub seq: usize,
  pub error: Option<Fault>,
}

impl Header {
  pub fn new(channel: String, method: String, seq: usize, error: Option<Fault>) -> Self {
    Header { channel, method, seq, error }
  }

  /// Header for the reply to this request.
  pub fn reply(&self, error: Option<Fault>) -> Self {
    Header { error, ..self.clone() }
  }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Body<T = Value> {
  pub contents: T,
}

impl<T> Body<T> {
  pub fn new(contents: T) -> Self {
    Body { contents }
  }
}

pub type Packet = (Header, Body);

/// Length-prefixed JSON frames: 8-byte little-endian length, then payload.
pub struct Codec<R, W> {
  reader: Mutex<R>,
  writer: Mutex<W>,
}

impl Codec<BufReader<TcpStream>, BufWriter<TcpStream>> {
  pub fn bind(stream: TcpStream) -> Result<Self, Error> {
    stream.set_nodelay(true)?;
    let reader = BufReader::new(stream.try_clone()?);
    Ok(Codec::new(reader, BufWriter::new(stream)))
  }
}

impl<R: Read, W: Write> Codec<R, W> {
  pub fn new(reader: R, writer: W) -> Self {
    Codec { reader: Mutex::new(reader), writer: Mutex::new(writer) }
  }

  pub fn encode<T: Serialize>(&self, value: &T) -> Result<(), Error> {
    let serialized = serde_json::to_vec(value)?;
    let len = (serialized.len() as u64).to_le_bytes();

    let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
    writer.write_all(&len)?;
    writer.write_all(&serialized)?;
    writer.flush()?;
    Ok(())
  }

  /// Reads the next frame; `None` once the peer has closed the stream.
  pub fn decode<T: DeserializeOwned>(&self) -> Result<Option<T>, Error> {
    let mut reader = self.reader.lock().unwrap_or_else(|e| e.into_inner());

    let mut buf = [0; 8];
    loop {
      match reader.read(&mut buf[..1]) {
        Ok(0) => return Ok(None),
        Ok(_) => break,
        Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
        Err(e) => return Err(e.into()),
      }
    }
    // a close inside the length prefix is corruption, not a clean shutdown
    match reader.read_exact(&mut buf[1..]) {
      Ok(()) => {}
      Err(ref e) if e.kind() == io::ErrorKind::UnexpectedEof => {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "stream closed inside a length prefix").into());
      }
      Err(e) => return Err(e.into()),
    }

    let len = u64::from_le_bytes(buf);
    if len > MAX_FRAME_LEN {
      return Err(io::Error::new(io::ErrorKind::InvalidData, format!("frame of {len} bytes exceeds limit")).into());
    }
    let mut message = vec![0; len as usize];
    reader.read_exact(&mut message)?;
    Ok(Some(serde_json::from_slice(&message)?))
  }

  pub fn into_parts(self) -> (R, W) {
    let reader = self.reader.into_inner().unwrap_or_else(|e| e.into_inner());
    let writer = self.writer.into_inner().unwrap_or_else(|e| e.into_inner());
    (reader, writer)
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::error::FaultKind;
  use serde_json::json;
  use std::io::Cursor;

  fn written(encode: impl FnOnce(&Codec<Cursor<Vec<u8>>, Vec<u8>>)) -> Codec<Cursor<Vec<u8>>, Vec<u8>> {
    let codec = Codec::new(Cursor::new(Vec::new()), Vec::new());
    encode(&codec);
    let (_, bytes) = codec.into_parts();
    Codec::new(Cursor::new(bytes), Vec::new())
  }

  #[test]
  fn test_frames_in_order() {
    let codec = written(|codec| {
      codec.encode(&Message::new(MAGIC_NUMBER)).unwrap();
      let header = Header::new("channel".to_string(), "setZoomLevel".to_string(), 1, None);
      codec.encode(&(header, Body::new(json!([2.0])))).unwrap();
    });

    let message: Message = codec.decode().unwrap().unwrap();
    assert_eq!(message.magic_number, MAGIC_NUMBER);

    let (header, body): Packet = codec.decode().unwrap().unwrap();
    assert_eq!(header.method, "setZoomLevel");
    assert_eq!(header.seq, 1);
    assert_eq!(body.contents, json!([2.0]));

    assert!(codec.decode::<Packet>().unwrap().is_none());
  }

  #[test]
  fn test_reply_header_carries_fault() {
    let request = Header::new("channel".to_string(), "noSuchMethod".to_string(), 7, None);
    let fault = Fault::new(FaultKind::InvalidMethod, "invalid method 'noSuchMethod'");
    let reply = request.reply(Some(fault.clone()));
    assert_eq!(reply.seq, 7);
    assert_eq!(reply.channel, "channel");
    assert_eq!(reply.error, Some(fault));
  }

  #[test]
  fn test_truncated_frame_is_an_error() {
    let mut bytes = 100u64.to_le_bytes().to_vec();
    bytes.extend_from_slice(b"{}");
    let codec = Codec::new(Cursor::new(bytes), Vec::new());
    assert!(matches!(codec.decode::<Message>(), Err(Error::Io(_))));
  }

  #[test]
  fn test_truncated_length_prefix_is_an_error() {
    let codec = Codec::new(Cursor::new(vec![3, 0, 0]), Vec::new());
    assert!(matches!(codec.decode::<Message>(), Err(Error::Io(ref e)) if e.kind() == io::ErrorKind::InvalidData));
  }

  #[test]
  fn test_oversized_frame_is_rejected() {
    let bytes = (MAX_FRAME_LEN + 1).to_le_bytes().to_vec();
    let codec = Codec::new(Cursor::new(bytes), Vec::new());
    assert!(matches!(codec.decode::<Message>(), Err(Error::Io(ref e)) if e.kind() == io::ErrorKind::InvalidData));
  }
}
