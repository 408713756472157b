//! Serialize a tiny scene graph with a shared material, then load it
//! back and show that sharing survives the round trip.

use std::cell::RefCell;
use std::io::{Read, Seek, SeekFrom, Write};
use std::rc::Rc;

use offset_graph::{ObjectReader, ObjectWriter, OffsetError, OffsetFormat, WireObject};
use value_codec::StringFormat;
use wire_layout::Endianness;

#[derive(Default, Debug)]
struct Material {
    name: String,
    roughness: f32,
}

impl WireObject for Material {
    fn read<S: Read + Seek>(r: &mut ObjectReader<S>) -> Result<Self, OffsetError> {
        Ok(Material {
            name: r
                .read_string_offset(StringFormat::NullTerminated)?
                .unwrap_or_default(),
            roughness: r.read::<f32>()?,
        })
    }

    fn write<S: Read + Write + Seek + 'static>(
        &self,
        w: &mut ObjectWriter<S>,
    ) -> Result<(), OffsetError> {
        w.write_string_offset(StringFormat::NullTerminated, &self.name, 1)?;
        w.write(self.roughness)?;
        Ok(())
    }
}

#[derive(Default, Debug)]
struct Node {
    name: String,
    transform: [f32; 3],
    material: Option<Rc<RefCell<Material>>>,
}

impl WireObject for Node {
    fn read<S: Read + Seek>(r: &mut ObjectReader<S>) -> Result<Self, OffsetError> {
        Ok(Node {
            name: r
                .read_string_offset(StringFormat::NullTerminated)?
                .unwrap_or_default(),
            transform: r.read::<[f32; 3]>()?,
            material: r.read_object_offset::<Material>()?,
        })
    }

    fn write<S: Read + Write + Seek + 'static>(
        &self,
        w: &mut ObjectWriter<S>,
    ) -> Result<(), OffsetError> {
        w.write_string_offset(StringFormat::NullTerminated, &self.name, 1)?;
        w.write(self.transform)?;
        w.write_object_offset(self.material.as_ref(), 0, 0)?;
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let steel = Rc::new(RefCell::new(Material {
        name: "steel".to_owned(),
        roughness: 0.35,
    }));
    let nodes = [
        Rc::new(RefCell::new(Node {
            name: "chassis".to_owned(),
            transform: [0.0, 0.0, 0.0],
            material: Some(Rc::clone(&steel)),
        })),
        Rc::new(RefCell::new(Node {
            name: "axle".to_owned(),
            transform: [0.0, -0.4, 1.2],
            material: Some(Rc::clone(&steel)),
        })),
    ];

    let file = tempfile::tempfile()?;
    let mut writer =
        ObjectWriter::new(file.try_clone()?, Endianness::Little, OffsetFormat::U32)?;
    writer.write(nodes.len() as u32)?;
    for node in &nodes {
        writer.write_object_offset(Some(node), 0, 0)?;
    }
    writer.flush()?;
    println!(
        "wrote {} bytes, {} offset slots",
        writer.length(),
        writer.handler().slot_count()
    );
    drop(writer);

    let mut file = file;
    file.seek(SeekFrom::Start(0))?;
    let mut reader = ObjectReader::new(file, Endianness::Little, OffsetFormat::U32)?;
    let count = reader.read::<u32>()? as usize;
    let loaded: Vec<_> = (0..count)
        .map(|_| reader.read_object_offset::<Node>())
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .flatten()
        .collect();

    for node in &loaded {
        let node = node.borrow();
        let material = node.material.as_ref().map(|m| m.borrow().name.clone());
        println!("{} @ {:?} material {:?}", node.name, node.transform, material);
    }

    let shared = match (&loaded[0].borrow().material, &loaded[1].borrow().material) {
        (Some(a), Some(b)) => Rc::ptr_eq(a, b),
        _ => false,
    };
    println!("material shared after load: {shared}");
    Ok(())
}
