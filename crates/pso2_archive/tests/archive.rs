use std::io::{Cursor, Read, Write};

use pretty_assertions::assert_eq;
use pso2_archive::{
    error::Error,
    ice::{IceFileHandle, IceWriterOptions},
    tag::{write_tag, Tag, TagFile},
    AfpArchive, AfpWriter, CompressionMethod, IceArchive, IceWriter, Model,
};
use tracing::info;
use tracing_test::traced_test;

fn build_afp(entries: &[(&str, &str, &[u8])]) -> Result<Vec<u8>, Error> {
    let mut writer = AfpWriter::new(Vec::new());
    for (name, kind, data) in entries {
        writer.start_entry(name, kind)?;
        writer.write_all(data)?;
    }
    writer.finish()
}

fn build_model() -> Result<Vec<u8>, Error> {
    let mut model = Vec::new();
    model.extend_from_slice(b"VTBF\x10\x00\x00\x00AQGF\x01\x00\x00\x4C");
    write_tag(&mut model, Tag::new(b"vtc0"), b"VSET\x01\x00\x02\x00")?;
    write_tag(&mut model, Tag::new(b"vtc0"), b"NODE")?;
    Ok(model)
}

fn build_ice() -> Result<Vec<u8>, Error> {
    let model = build_model()?;
    let afp = build_afp(&[
        ("body.aqp", "aqp", model.as_slice()),
        ("notes.txt", "txt", &b"plain text"[..]),
    ])?;

    let mut writer = IceWriter::new(Vec::new());
    writer.start_group(CompressionMethod::None)?;
    writer.start_file("readme.txt", "txt")?;
    writer.write_all(b"group one")?;

    writer.start_group(CompressionMethod::Prs)?;
    writer.start_file("models.afp", "afp")?;
    writer.write_all(&afp)?;
    writer.start_file("readme.txt", "txt")?;
    writer.write_all(&b"group two ".repeat(64))?;

    writer.finish()
}

#[traced_test]
#[test]
fn nested_archives_read_back() -> Result<(), Error> {
    let bytes = build_ice()?;
    let mut ice = IceArchive::new(Cursor::new(bytes))?;
    assert_eq!(ice.len(), 3);

    let mut afp = Vec::new();
    ice.by_name(1, "models.afp")?.read_to_end(&mut afp)?;

    let mut afp = AfpArchive::new(Cursor::new(afp))?;
    assert_eq!(afp.file_names().collect::<Vec<_>>(), vec!["body.aqp", "notes.txt"]);

    let mut model = Vec::new();
    afp.by_name("body.aqp")?.read_to_end(&mut model)?;
    assert_eq!(model, build_model()?);

    let parsed = Model::parse(&model)?;
    assert_eq!(parsed.chunks.len(), 2);
    info!(?parsed, "parsed model");

    let tags = TagFile::new(Cursor::new(&model[0x10..]))
        .map(|chunk| chunk.map(|c| c.size))
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(tags, vec![8, 4]);

    Ok(())
}

#[traced_test]
#[test]
fn untouched_archives_round_trip() -> Result<(), Error> {
    let bytes = build_ice()?;
    let mut ice = IceArchive::new(Cursor::new(bytes.clone()))?;
    assert_eq!(ice.write(Vec::new(), IceWriterOptions::default())?, bytes);

    let afp = build_afp(&[("a", "bin", &[1u8, 2, 3][..]), ("b", "bin", &[0u8; 0x40][..])])?;
    let mut archive = AfpArchive::new(Cursor::new(afp.clone()))?;
    assert_eq!(archive.write(Vec::new())?, afp);

    Ok(())
}

#[traced_test]
#[test]
fn replace_nested_entry_and_rewrite() -> Result<(), Error> {
    let mut ice = IceArchive::new(Cursor::new(build_ice()?))?;
    let handle = ice
        .find(1, "models.afp")
        .ok_or(Error::CustomError("models.afp is missing".into()))?;

    let mut data = Vec::new();
    ice.by_index(handle)?.read_to_end(&mut data)?;

    let mut afp = AfpArchive::new(Cursor::new(data))?;
    let notes = afp
        .index_for_name("notes.txt")
        .ok_or(Error::CustomError("notes.txt is missing".into()))?;
    afp.replace_with_reader(notes, &b"rewritten notes"[..], 15)?;
    let afp = afp.write(Vec::new())?;

    ice.replace(handle, Some(afp))?;
    ice.replace(IceFileHandle { group: 0, index: 0 }, None)?;
    let rewritten = ice.write(Vec::new(), IceWriterOptions::default())?;

    let mut ice = IceArchive::new(Cursor::new(rewritten))?;
    assert_eq!(ice.group_len(0), Some(0));
    assert_eq!(
        ice.groups().map(|g| g.compression()).collect::<Vec<_>>(),
        vec![CompressionMethod::None, CompressionMethod::None]
    );

    let mut data = Vec::new();
    ice.by_name(1, "models.afp")?.read_to_end(&mut data)?;
    let mut afp = AfpArchive::new(Cursor::new(data))?;

    let mut notes = String::new();
    afp.by_name("notes.txt")?.read_to_string(&mut notes)?;
    assert_eq!(notes, "rewritten notes");

    let mut readme = Vec::new();
    ice.by_name(1, "readme.txt")?.read_to_end(&mut readme)?;
    assert_eq!(readme, b"group two ".repeat(64));

    Ok(())
}
