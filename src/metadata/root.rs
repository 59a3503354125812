//! The metadata root (`BSJB` header) and its stream directory.
//!
//! # Reference
//! - [ECMA-335 II.24.2.1](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use crate::{
    file::io::{push_le, read_le, read_le_at},
    metadata::streams::StreamHeader,
    Error::OutOfBounds,
    Result,
};

/// Magic signature of the metadata root (`BSJB`)
pub const CIL_HEADER_MAGIC: u32 = 0x424A_5342;

/// The metadata root of an assembly.
#[derive(Clone, Debug, PartialEq)]
pub struct Root {
    /// Major version, 1
    pub major_version: u16,
    /// Minor version, 1
    pub minor_version: u16,
    /// Reserved, always 0
    pub reserved: u32,
    /// Length of the version field including padding
    pub length: u32,
    /// The runtime version string, without padding
    pub version: String,
    /// Reserved flags
    pub flags: u16,
    /// The stream directory, in declaration order
    pub stream_headers: Vec<StreamHeader>,
}

impl Root {
    /// Parse the metadata root at the start of `data`.
    ///
    /// Every declared stream must lie within `data`.
    ///
    /// # Errors
    /// Returns an error if the signature does not match, the header is truncated or a stream
    /// exceeds the metadata.
    pub fn read(data: &[u8]) -> Result<Root> {
        if data.len() < 36 {
            return Err(OutOfBounds);
        }

        let signature = read_le::<u32>(data)?;
        if signature != CIL_HEADER_MAGIC {
            return Err(malformed_error!(
                "CIL_HEADER_MAGIC does not match - {}",
                signature
            ));
        }

        let length = read_le_at::<u32>(data, &mut 12)?;
        let Some(version_end) = (length as usize).checked_add(16) else {
            return Err(malformed_error!("Version string length overflows - {}", length));
        };
        if version_end + 4 > data.len() {
            return Err(OutOfBounds);
        }

        let version_bytes = &data[16..version_end];
        let version_len = version_bytes
            .iter()
            .position(|byte| *byte == 0)
            .unwrap_or(version_bytes.len());
        let version: String = version_bytes[..version_len]
            .iter()
            .map(|byte| char::from(*byte))
            .collect();

        let mut offset = version_end;
        let flags = read_le_at::<u16>(data, &mut offset)?;
        let stream_count = read_le_at::<u16>(data, &mut offset)?;
        if stream_count == 0 || stream_count > 6 {
            return Err(malformed_error!("Invalid stream count - {}", stream_count));
        }

        let mut stream_headers = Vec::with_capacity(stream_count as usize);
        for _ in 0..stream_count {
            let Some(header_data) = data.get(offset..) else {
                return Err(OutOfBounds);
            };

            let stream = StreamHeader::from(header_data)?;
            match stream.offset.checked_add(stream.size) {
                Some(end) if end as usize <= data.len() => {}
                Some(_) => return Err(OutOfBounds),
                None => {
                    return Err(malformed_error!(
                        "Stream offset and size cause integer overflow - {} + {}",
                        stream.offset,
                        stream.size
                    ))
                }
            }

            offset += stream.encoded_len();
            stream_headers.push(stream);
        }

        Ok(Root {
            major_version: read_le::<u16>(&data[4..])?,
            minor_version: read_le::<u16>(&data[6..])?,
            reserved: read_le::<u32>(&data[8..])?,
            length,
            version,
            flags,
            stream_headers,
        })
    }

    /// Header of the stream called `name`.
    #[must_use]
    pub fn stream(&self, name: &str) -> Option<&StreamHeader> {
        self.stream_headers.iter().find(|stream| stream.name == name)
    }

    /// Build a complete metadata blob from this root and the given stream contents.
    ///
    /// `streams` lists `(name, data)` pairs in the order they are laid out; every stream is
    /// padded to a multiple of 4 and the directory is regenerated from it.
    ///
    /// # Errors
    /// Returns an error if a stream is too large for the 32-bit offsets of the directory.
    pub fn write(&self, streams: &[(&str, &[u8])]) -> Result<Vec<u8>> {
        let version_field = (self.version.len() + 1 + 3) & !3;
        let length = version_field.max(self.length as usize);

        let mut headers: Vec<StreamHeader> = streams
            .iter()
            .map(|(name, _)| StreamHeader {
                offset: 0,
                size: 0,
                name: (*name).to_string(),
            })
            .collect();

        let directory_len: usize = headers.iter().map(StreamHeader::encoded_len).sum();
        let mut stream_offset = 16 + length + 4 + directory_len;
        for (header, (_, data)) in headers.iter_mut().zip(streams) {
            let padded = (data.len() + 3) & !3;
            header.offset = u32::try_from(stream_offset)
                .map_err(|_| malformed_error!("Metadata exceeds 4GB"))?;
            header.size =
                u32::try_from(padded).map_err(|_| malformed_error!("Stream exceeds 4GB"))?;
            stream_offset += padded;
        }

        let mut buffer = Vec::with_capacity(stream_offset);
        push_le::<u32>(&mut buffer, CIL_HEADER_MAGIC);
        push_le::<u16>(&mut buffer, self.major_version);
        push_le::<u16>(&mut buffer, self.minor_version);
        push_le::<u32>(&mut buffer, self.reserved);
        push_le::<u32>(
            &mut buffer,
            u32::try_from(length).map_err(|_| malformed_error!("Version string too long"))?,
        );
        buffer.extend_from_slice(self.version.as_bytes());
        buffer.resize(16 + length, 0);
        push_le::<u16>(&mut buffer, self.flags);
        push_le::<u16>(
            &mut buffer,
            u16::try_from(headers.len()).map_err(|_| malformed_error!("Too many streams"))?,
        );

        for header in &headers {
            header.write(&mut buffer);
        }

        for (_, data) in streams {
            buffer.extend_from_slice(data);
            while buffer.len() % 4 != 0 {
                buffer.push(0);
            }
        }

        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rustfmt::skip]
    const ROOT: [u8; 72] = [
        0x42, 0x53, 0x4A, 0x42, // BSJB
        0x01, 0x00, 0x01, 0x00, // 1.1
        0x00, 0x00, 0x00, 0x00, // reserved
        0x0C, 0x00, 0x00, 0x00, // version length
        b'v', b'4', b'.', b'0', b'.', b'3', b'0', b'3', b'1', b'9', 0x00, 0x00,
        0x00, 0x00,             // flags
        0x02, 0x00,             // streams
        0x40, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, b'#', b'~', 0x00, 0x00,
        0x44, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00,
        b'#', b'S', b't', b'r', b'i', b'n', b'g', b's', 0x00, 0x00, 0x00, 0x00,
        0x01, 0x02, 0x03, 0x04, // #~
        0x00, 0x41, 0x00, 0x00, // #Strings
    ];

    #[test]
    fn crafted() {
        let root = Root::read(&ROOT).unwrap();

        assert_eq!(root.major_version, 1);
        assert_eq!(root.version, "v4.0.30319");
        assert_eq!(root.length, 12);
        assert_eq!(root.stream_headers.len(), 2);
        assert_eq!(root.stream("#~").unwrap().offset, 0x40);
        assert_eq!(root.stream("#Strings").unwrap().size, 4);
        assert!(root.stream("#Blob").is_none());
    }

    #[test]
    fn write_identical() {
        let root = Root::read(&ROOT).unwrap();
        let written = root
            .write(&[("#~", &ROOT[0x40..0x44]), ("#Strings", &ROOT[0x44..0x48])])
            .unwrap();

        assert_eq!(written, ROOT);
    }

    #[test]
    fn write_grown_stream() {
        let root = Root::read(&ROOT).unwrap();
        let strings = [0x00, 0x41, 0x00, 0x42, 0x43, 0x00];
        let written = root.write(&[("#~", &[1, 2, 3, 4]), ("#Strings", &strings)]).unwrap();

        let reread = Root::read(&written).unwrap();
        let header = reread.stream("#Strings").unwrap();
        assert_eq!(header.offset, 0x44);
        assert_eq!(header.size, 8);
        assert_eq!(&written[0x44..0x4A], &strings);
    }

    #[test]
    fn invalid() {
        let mut data = ROOT;
        data[0] = 0x43;
        assert!(Root::read(&data).is_err());

        // stream exceeding the metadata
        let mut data = ROOT;
        data[36] = 0xFF;
        assert!(matches!(Root::read(&data), Err(OutOfBounds)));

        assert!(Root::read(&ROOT[..30]).is_err());
    }
}
