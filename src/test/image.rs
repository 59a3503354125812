//! Synthesizes minimal managed PE images for tests.
//!
//! The images are valid PE32 DLLs with a single `.text` section holding the CLI header, an
//! optional strong-name signature slot and the metadata. Layout:
//!
//! ```text
//! 0x000  DOS header, e_lfanew = 0x80
//! 0x080  PE signature, COFF header, PE32 optional header (16 data directories)
//! 0x178  section table (.text), room for further section headers up to 0x200
//! 0x200  .text (RVA 0x2000): CLI header, signature slot, metadata
//! ```
//!
//! Only the standard library is used, so the builder can be shared with integration tests.

use std::collections::HashMap;

const FILE_ALIGNMENT: usize = 0x200;
const SECTION_ALIGNMENT: usize = 0x2000;
const TEXT_RVA: usize = 0x2000;
const OPTIONAL_OFFSET: usize = 0x98;
const SECTION_TABLE: usize = OPTIONAL_OFFSET + 0xE0;

type Version = (u16, u16, u16, u16);

/// Builder for a synthetic managed assembly.
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    name: String,
    version: Version,
    culture: String,
    public_key: Option<Vec<u8>>,
    references: Vec<(String, Version, Option<[u8; 8]>)>,
    friends: Vec<String>,
    signature_slot: usize,
    crowded: bool,
}

impl ImageBuilder {
    /// An unsigned, culture-neutral assembly `name` with version 1.0.0.0.
    pub fn new(name: &str) -> Self {
        ImageBuilder {
            name: name.to_string(),
            version: (1, 0, 0, 0),
            culture: String::new(),
            public_key: None,
            references: Vec::new(),
            friends: Vec::new(),
            signature_slot: 0,
            crowded: false,
        }
    }

    /// Set the assembly version.
    pub fn version(mut self, major: u16, minor: u16, build: u16, revision: u16) -> Self {
        self.version = (major, minor, build, revision);
        self
    }

    /// Set the assembly culture.
    pub fn culture(mut self, culture: &str) -> Self {
        self.culture = culture.to_string();
        self
    }

    /// Declare the assembly strong-named with `public_key` and reserve a signature slot of
    /// `signature_size` bytes.
    pub fn public_key(mut self, public_key: &[u8], signature_size: usize) -> Self {
        self.public_key = Some(public_key.to_vec());
        self.signature_slot = signature_size;
        self
    }

    /// Add an `AssemblyRef` row.
    pub fn reference(mut self, name: &str, version: Version, token: Option<[u8; 8]>) -> Self {
        self.references.push((name.to_string(), version, token));
        self
    }

    /// Add an `InternalsVisibleToAttribute` on the assembly.
    pub fn internals_visible_to(mut self, value: &str) -> Self {
        self.friends.push(value.to_string());
        self
    }

    /// Reserve a strong-name signature slot.
    pub fn signature_slot(mut self, size: usize) -> Self {
        self.signature_slot = size;
        self
    }

    /// Leave no room for an additional section header.
    pub fn crowded_headers(mut self) -> Self {
        self.crowded = true;
        self
    }

    /// Produce the image bytes.
    pub fn build(&self) -> Vec<u8> {
        let mut text = vec![0_u8; 72];
        let signature_offset = text.len();
        text.resize(align(signature_offset + self.signature_slot, 4), 0);

        let metadata_offset = text.len();
        let metadata = self.metadata();
        text.extend_from_slice(&metadata);
        let virtual_size = text.len();

        // CLI header
        put_u32(&mut text, 0, 72);
        put_u16(&mut text, 4, 2);
        put_u16(&mut text, 6, 5);
        put_u32(&mut text, 8, (TEXT_RVA + metadata_offset) as u32);
        put_u32(&mut text, 12, metadata.len() as u32);
        let signed = if self.public_key.is_some() { 0x08 } else { 0 };
        put_u32(&mut text, 16, 0x01 | signed);
        if self.signature_slot > 0 {
            put_u32(&mut text, 32, (TEXT_RVA + signature_offset) as u32);
            put_u32(&mut text, 36, self.signature_slot as u32);
        }

        let raw_size = align(text.len(), FILE_ALIGNMENT);
        text.resize(raw_size, 0);

        let mut image = vec![0_u8; FILE_ALIGNMENT];
        put_u16(&mut image, 0, 0x5A4D);
        put_u32(&mut image, 0x3C, 0x80);
        put_u32(&mut image, 0x80, 0x0000_4550);

        // COFF header
        put_u16(&mut image, 0x84, 0x014C);
        put_u16(&mut image, 0x86, 1);
        put_u16(&mut image, 0x94, 0xE0);
        put_u16(&mut image, 0x96, 0x2102);

        // PE32 optional header
        let opt = OPTIONAL_OFFSET;
        put_u16(&mut image, opt, 0x010B);
        image[opt + 2] = 8;
        put_u32(&mut image, opt + 4, raw_size as u32);
        put_u32(&mut image, opt + 20, TEXT_RVA as u32);
        put_u32(&mut image, opt + 28, 0x1000_0000);
        put_u32(&mut image, opt + 32, SECTION_ALIGNMENT as u32);
        put_u32(&mut image, opt + 36, FILE_ALIGNMENT as u32);
        put_u16(&mut image, opt + 40, 4);
        put_u16(&mut image, opt + 48, 4);
        put_u32(
            &mut image,
            opt + 56,
            align(TEXT_RVA + virtual_size, SECTION_ALIGNMENT) as u32,
        );
        put_u32(&mut image, opt + 60, FILE_ALIGNMENT as u32);
        put_u16(&mut image, opt + 68, 3);
        put_u16(&mut image, opt + 70, 0x8540);
        put_u32(&mut image, opt + 72, 0x10_0000);
        put_u32(&mut image, opt + 76, 0x1000);
        put_u32(&mut image, opt + 80, 0x10_0000);
        put_u32(&mut image, opt + 84, 0x1000);
        put_u32(&mut image, opt + 92, 16);
        // CLR runtime header directory
        put_u32(&mut image, opt + 96 + 14 * 8, TEXT_RVA as u32);
        put_u32(&mut image, opt + 96 + 14 * 8 + 4, 72);

        // .text section header
        image[SECTION_TABLE..SECTION_TABLE + 5].copy_from_slice(b".text");
        put_u32(&mut image, SECTION_TABLE + 8, virtual_size as u32);
        put_u32(&mut image, SECTION_TABLE + 12, TEXT_RVA as u32);
        put_u32(&mut image, SECTION_TABLE + 16, raw_size as u32);
        put_u32(&mut image, SECTION_TABLE + 20, FILE_ALIGNMENT as u32);
        put_u32(&mut image, SECTION_TABLE + 36, 0x6000_0020);

        if self.crowded {
            image[SECTION_TABLE + 40..SECTION_TABLE + 80].fill(0xCC);
        }

        image.extend_from_slice(&text);
        image
    }

    fn metadata(&self) -> Vec<u8> {
        let mut strings = Heap::strings();
        let mut blobs = Heap::blobs();

        let module_name = strings.add(format!("{}.dll", self.name).as_bytes());
        let assembly_name = strings.add(self.name.as_bytes());
        let culture = strings.add(self.culture.as_bytes());
        let public_key = self
            .public_key
            .as_ref()
            .map_or(0, |public_key| blobs.add(public_key));

        // Version, PublicKeyOrToken, Name; Flags, Culture and HashValue are written as 0
        let references: Vec<[u16; 6]> = self
            .references
            .iter()
            .map(|(name, version, token)| {
                let token = token.map_or(0, |token| blobs.add(&token));
                [
                    version.0,
                    version.1,
                    version.2,
                    version.3,
                    token,
                    strings.add(name.as_bytes()),
                ]
            })
            .collect();

        let mut tables = Vec::new();
        let mut valid = 0_u64;
        let mut row_counts = Vec::new();

        // Module
        valid |= 1;
        row_counts.push(1_u32);
        for value in [0, module_name, 1, 0, 0] {
            push_u16(&mut tables, value);
        }

        if !self.friends.is_empty() {
            let namespace = strings.add(b"System.Runtime.CompilerServices");
            let type_name = strings.add(b"InternalsVisibleToAttribute");
            let ctor = strings.add(b".ctor");
            let signature = blobs.add(&[0x20, 0x01, 0x01, 0x0E]);

            // TypeRef scoped to the module
            valid |= 1 << 0x01;
            row_counts.push(1);
            for value in [(1 << 2), type_name, namespace] {
                push_u16(&mut tables, value);
            }

            // MemberRef .ctor(string) on TypeRef 1
            valid |= 1 << 0x0A;
            row_counts.push(1);
            for value in [(1 << 3) | 1, ctor, signature] {
                push_u16(&mut tables, value);
            }

            // CustomAttribute rows on the assembly
            valid |= 1 << 0x0C;
            row_counts.push(self.friends.len() as u32);
            for friend in &self.friends {
                let mut value = vec![0x01, 0x00];
                push_compressed(&mut value, friend.len());
                value.extend_from_slice(friend.as_bytes());
                value.extend_from_slice(&[0x00, 0x00]);
                let value = blobs.add(&value);

                for column in [(1 << 5) | 14, (1 << 3) | 3, value] {
                    push_u16(&mut tables, column);
                }
            }
        }

        // Assembly
        valid |= 1 << 0x20;
        row_counts.push(1);
        tables.extend_from_slice(&0x8004_u32.to_le_bytes());
        for value in [self.version.0, self.version.1, self.version.2, self.version.3] {
            push_u16(&mut tables, value);
        }
        let flags = u32::from(self.public_key.is_some());
        tables.extend_from_slice(&flags.to_le_bytes());
        for value in [public_key, assembly_name, culture] {
            push_u16(&mut tables, value);
        }

        if !references.is_empty() {
            valid |= 1 << 0x23;
            row_counts.push(references.len() as u32);
            for row in &references {
                for value in &row[..4] {
                    push_u16(&mut tables, *value);
                }
                tables.extend_from_slice(&0_u32.to_le_bytes());
                for value in [row[4], row[5], 0, 0] {
                    push_u16(&mut tables, value);
                }
            }
        }

        let mut stream = Vec::new();
        stream.extend_from_slice(&0_u32.to_le_bytes());
        stream.extend_from_slice(&[2, 0, 0, 1]);
        stream.extend_from_slice(&valid.to_le_bytes());
        stream.extend_from_slice(&0_u64.to_le_bytes());
        for count in row_counts {
            stream.extend_from_slice(&count.to_le_bytes());
        }
        stream.extend_from_slice(&tables);

        let guid: Vec<u8> = (1..=16).collect();
        let streams: [(&str, Vec<u8>); 5] = [
            ("#~", stream),
            ("#Strings", strings.finish()),
            ("#US", vec![0]),
            ("#GUID", guid),
            ("#Blob", blobs.finish()),
        ];

        let mut header_len = 16 + 12 + 4;
        for (name, _) in &streams {
            header_len += 8 + align(name.len() + 1, 4);
        }

        let mut root = Vec::new();
        root.extend_from_slice(&0x424A_5342_u32.to_le_bytes());
        root.extend_from_slice(&[1, 0, 1, 0, 0, 0, 0, 0]);
        root.extend_from_slice(&12_u32.to_le_bytes());
        root.extend_from_slice(b"v4.0.30319\0\0");
        root.extend_from_slice(&[0, 0]);
        root.extend_from_slice(&(streams.len() as u16).to_le_bytes());

        let mut offset = header_len;
        for (name, data) in &streams {
            let size = align(data.len(), 4);
            root.extend_from_slice(&(offset as u32).to_le_bytes());
            root.extend_from_slice(&(size as u32).to_le_bytes());
            root.extend_from_slice(name.as_bytes());
            root.resize(align(root.len() + 1, 4), 0);
            offset += size;
        }

        for (_, data) in &streams {
            root.extend_from_slice(data);
            root.resize(align(root.len(), 4), 0);
        }

        root
    }
}

struct Heap {
    data: Vec<u8>,
    entries: HashMap<Vec<u8>, u16>,
    length_prefixed: bool,
}

impl Heap {
    fn strings() -> Self {
        Heap {
            data: vec![0],
            entries: HashMap::new(),
            length_prefixed: false,
        }
    }

    fn blobs() -> Self {
        Heap {
            data: vec![0],
            entries: HashMap::new(),
            length_prefixed: true,
        }
    }

    fn add(&mut self, value: &[u8]) -> u16 {
        if value.is_empty() {
            return 0;
        }
        if let Some(index) = self.entries.get(value) {
            return *index;
        }

        let index = self.data.len() as u16;
        if self.length_prefixed {
            push_compressed(&mut self.data, value.len());
            self.data.extend_from_slice(value);
        } else {
            self.data.extend_from_slice(value);
            self.data.push(0);
        }

        self.entries.insert(value.to_vec(), index);
        index
    }

    fn finish(self) -> Vec<u8> {
        self.data
    }
}

fn align(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}

fn push_u16(buffer: &mut Vec<u8>, value: u16) {
    buffer.extend_from_slice(&value.to_le_bytes());
}

fn put_u16(buffer: &mut [u8], offset: usize, value: u16) {
    buffer[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buffer: &mut [u8], offset: usize, value: u32) {
    buffer[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn push_compressed(buffer: &mut Vec<u8>, value: usize) {
    if value < 0x80 {
        buffer.push(value as u8);
    } else {
        buffer.push(0x80 | (value >> 8) as u8);
        buffer.push(value as u8);
    }
}
