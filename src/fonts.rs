use std::fs;
use std::path::Path;

use ab_glyph::FontArc;
use fontdb::{Database, Family, Query, Source};
use tracing::debug;

use crate::error::Error;

/// Load the font used to measure hidden content.
///
/// An explicit `path` must decode; otherwise the system font database is
/// searched for a sans-serif face.
pub fn load_font(path: Option<&Path>) -> Result<FontArc, Error> {
    if let Some(path) = path {
        let data = fs::read(path)?;
        return FontArc::try_from_vec(data).map_err(|err| {
            Error::Font(format!("failed to decode font at {}: {err}", path.display()))
        });
    }

    let mut db = Database::new();
    db.load_system_fonts();

    let preferred_families = [
        Family::Name("Inter"),
        Family::Name("Noto Sans"),
        Family::Name("DejaVu Sans"),
        Family::SansSerif,
    ];

    for family in preferred_families {
        if let Some(id) = db.query(&Query {
            families: &[family],
            ..Default::default()
        }) && let Some(font) = load_face(&db, id)?
        {
            return Ok(font);
        }
    }

    for face in db.faces() {
        if let Some(font) = load_face(&db, face.id)? {
            return Ok(font);
        }
    }

    Err(Error::Font("no system font available".into()))
}

fn load_face(db: &Database, id: fontdb::ID) -> Result<Option<FontArc>, Error> {
    let Some(face) = db.face(id) else {
        return Ok(None);
    };
    let data = match &face.source {
        Source::Binary(data) => data.as_ref().as_ref().to_vec(),
        Source::File(path) => fs::read(path)?,
        Source::SharedFile(_, data) => data.as_ref().as_ref().to_vec(),
    };
    match FontArc::try_from_vec(data) {
        Ok(font) => {
            debug!(family = ?face.families.first(), "loaded system font");
            Ok(Some(font))
        }
        Err(err) => {
            debug!("skipping undecodable font face: {err}");
            Ok(None)
        }
    }
}
