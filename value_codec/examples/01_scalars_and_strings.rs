//! Write a small big-endian record with a name table, then read it back.

use bytemuck_derive::{Pod, Zeroable};
use std::io::Cursor;
use value_codec::{StringFormat, ValueReader, ValueWriter};
use wire_layout::{Endianness, impl_wire_value};

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct Record {
    id: u32,
    weight: f32,
    flags: u16,
    kind: u16,
}
impl_wire_value!(Record { id: u32, weight: f32, flags: u16, kind: u16 });

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let records = [
        Record { id: 1, weight: 0.5, flags: 0b101, kind: 2 },
        Record { id: 2, weight: 1.5, flags: 0b010, kind: 7 },
    ];
    let names = ["ember", "quartz"];

    let mut stream = Cursor::new(Vec::new());
    {
        let mut writer = ValueWriter::new(&mut stream, Endianness::Big)?;
        writer.write::<u32>(records.len() as u32)?;
        writer.write_array(&records)?;
        writer.write_string_array(StringFormat::Prefixed16, &names)?;
        writer.flush()?;
    }
    println!("encoded {} bytes", stream.get_ref().len());

    stream.set_position(0);
    let mut reader = ValueReader::new(&mut stream, Endianness::Big)?;
    let count = reader.read::<u32>()? as usize;
    let decoded = reader.read_array::<Record>(count)?;
    let decoded_names = reader.read_string_array(StringFormat::Prefixed16, count)?;

    for (record, name) in decoded.iter().zip(&decoded_names) {
        println!("{name}: {record:?}");
    }
    Ok(())
}
