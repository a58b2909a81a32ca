//! Writing plans and changesets.
use std::{
    fs::File,
    io::{self, Write},
    path::{Path, PathBuf},
};

use serde::Serialize;
use snafu::{ResultExt, Snafu};

use crate::cli::OutputFormat;

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to create output file {path:?}"))]
    CreateFile {
        source: io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to serialize YAML"))]
    SerializeYaml { source: serde_yaml::Error },

    #[snafu(display("failed to serialize JSON"))]
    SerializeJson { source: serde_json::Error },

    #[snafu(display("failed to write YAML document separator"))]
    WriteDocumentSeparator { source: io::Error },

    #[snafu(display("failed to write output"))]
    Write { source: io::Error },
}

/// Opens `path` for writing, or stdout if there is none.
pub fn open(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(File::create(path).context(CreateFileSnafu { path })?),
        None => Box::new(io::stdout().lock()),
    })
}

pub fn write<T, W>(mut writer: W, format: OutputFormat, value: &T) -> Result<()>
where
    T: Serialize,
    W: Write,
{
    match format {
        OutputFormat::Yaml => serialize_to_explicit_document(writer, value),
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, value).context(SerializeJsonSnafu)?;
            writer.write_all(b"\n").context(WriteSnafu)
        }
    }
}

/// Serializes the given data structure as an explicit YAML document and writes it to a [`Write`].
fn serialize_to_explicit_document<T, W>(mut writer: W, value: &T) -> Result<()>
where
    T: Serialize,
    W: Write,
{
    writer
        .write_all(b"---\n")
        .context(WriteDocumentSeparatorSnafu)?;
    let mut serializer = serde_yaml::Serializer::new(writer);
    serde_yaml::with::singleton_map_recursive::serialize(value, &mut serializer)
        .context(SerializeYamlSnafu)?;
    Ok(())
}
