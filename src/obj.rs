//! Wavefront OBJ geometry: `v` and `f` records only.

use std::fs;
use std::path::Path;

use navtile_geom::TriMesh;

#[derive(Debug, thiserror::Error)]
pub enum ObjError {
    #[error("line {line}: {msg}")]
    Parse { line: usize, msg: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn parse_err(line: usize, msg: impl Into<String>) -> ObjError {
    ObjError::Parse { line, msg: msg.into() }
}

// Resolves one `f` vertex token (`i`, `i/t`, `i/t/n`, `i//n`) to a zero-based index.
fn face_index(token: &str, vert_count: usize, line: usize) -> Result<u32, ObjError> {
    let head = token.split('/').next().unwrap_or(token);
    let i: i64 = head.parse().map_err(|_| parse_err(line, format!("bad face index '{token}'")))?;
    let resolved = match i {
        0 => return Err(parse_err(line, "face index 0")),
        i if i > 0 => i - 1,
        i => vert_count as i64 + i,
    };
    if resolved < 0 || resolved as usize >= vert_count {
        return Err(parse_err(line, format!("face index {i} out of range ({vert_count} vertices)")));
    }
    Ok(resolved as u32)
}

/// Parses OBJ text. Faces with more than three corners become fans around
/// their first corner.
pub fn parse_obj(text: &str) -> Result<TriMesh, ObjError> {
    let mut verts = Vec::new();
    let mut tris = Vec::new();
    for (n, raw) in text.lines().enumerate() {
        let line = n + 1;
        let raw = raw.split('#').next().unwrap_or("");
        let mut fields = raw.split_whitespace();
        match fields.next() {
            Some("v") => {
                let mut p = [0.0f32; 3];
                for c in &mut p {
                    let f = fields.next().ok_or_else(|| parse_err(line, "vertex needs three coordinates"))?;
                    *c = f.parse().map_err(|_| parse_err(line, format!("bad coordinate '{f}'")))?;
                }
                verts.push(p);
            }
            Some("f") => {
                let idx = fields
                    .map(|t| face_index(t, verts.len(), line))
                    .collect::<Result<Vec<_>, _>>()?;
                if idx.len() < 3 {
                    return Err(parse_err(line, "face needs at least three vertices"));
                }
                for k in 2..idx.len() {
                    tris.push([idx[0], idx[k - 1], idx[k]]);
                }
            }
            _ => {}
        }
    }
    Ok(TriMesh::new(verts, tris))
}

pub fn load_obj(path: &Path) -> Result<TriMesh, ObjError> {
    let text = fs::read_to_string(path)?;
    let mesh = parse_obj(&text)?;
    log::debug!("{}: {} vertices, {} triangles", path.display(), mesh.verts.len(), mesh.tris.len());
    Ok(mesh)
}

/// Writes extracted geometry back out as OBJ text.
pub fn write_obj(verts: &[[f32; 3]], tris: &[[u32; 3]], out: &mut impl std::io::Write) -> std::io::Result<()> {
    for v in verts {
        writeln!(out, "v {} {} {}", v[0], v[1], v[2])?;
    }
    for t in tris {
        writeln!(out, "f {} {} {}", t[0] + 1, t[1] + 1, t[2] + 1)?;
    }
    Ok(())
}
