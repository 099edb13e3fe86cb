//! Installer container (xar) support.
//!
//! A flat installer package is a xar archive. Runtime files live in sections
//! named `Payload`, each a gzip compressed cpio archive, so reading one is
//! three layers deep: xar section → gzip → cpio. `apple_xar` handles the
//! container and its table of contents.

use super::{EntryMeta, cpio};
use crate::bundler::error::{Error, Result};
use apple_xar::reader::XarReader;
use flate2::read::GzDecoder;
use std::{fs::File, io::Cursor, io::Read, ops::ControlFlow};

const PAYLOAD: &str = "Payload";

/// Streams the cpio entries of every `Payload` section to `visit`.
pub(super) fn walk_payloads<F>(file: File, visit: &mut F) -> Result<()>
where
    F: FnMut(&EntryMeta, &mut dyn Read) -> Result<ControlFlow<()>>,
{
    let mut xar = XarReader::new(file).map_err(xar_error)?;

    let payloads: Vec<String> = xar
        .files()
        .map_err(xar_error)?
        .into_iter()
        .map(|(path, _)| path)
        .filter(|path| path.rsplit('/').next() == Some(PAYLOAD))
        .collect();
    if payloads.is_empty() {
        return Err(Error::format("xar", "no Payload section in installer container"));
    }

    for path in payloads {
        let Some(data) = xar.get_file_data_from_path(&path).map_err(xar_error)? else {
            log::debug!("Installer section {path} has no data");
            continue;
        };
        log::debug!("Reading installer section {path} ({} bytes)", data.len());

        let mut stopped = false;
        cpio::walk(
            GzDecoder::new(Cursor::new(data)),
            &mut |meta: &EntryMeta, content: &mut dyn Read| {
                let flow = visit(meta, content)?;
                stopped = flow.is_break();
                Ok(flow)
            },
        )?;

        if stopped {
            break;
        }
    }

    Ok(())
}

/// Anything the container layer rejects, including an unreadable table of
/// contents, is a malformed installer.
fn xar_error(error: apple_xar::Error) -> Error {
    Error::format("xar", error.to_string())
}
