//! Solution snapshots.
//!
//! A `.sol` file holds a `#time :` header and one tab-separated row per
//! node: index, position, magnetization, scalar potential. Positions are
//! written divided by the mesh scaling factor so the file reads in the
//! units the mesh was drawn in. The same file restarts a later run.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use nalgebra::Vector3;
use umag_mesh::Mesh;

use crate::error::{IoError, Result};

pub fn write_sol(path: &Path, mesh: &Mesh, scale: f64, time: f64) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "#time : {time:+.10e}")?;
    for (i, n) in mesh.nodes.iter().enumerate() {
        let p = n.position / scale;
        writeln!(
            out,
            "{i}\t{:+.10e} {:+.10e} {:+.10e}\t{:+.10e} {:+.10e} {:+.10e}\t{:+.10e}",
            p.x, p.y, p.z, n.u.x, n.u.y, n.u.z, n.phi
        )?;
    }
    Ok(())
}

/// Load a snapshot back into the mesh for a restart; returns the saved
/// simulation time.
///
/// Node order must match the mesh the file was written from: each row's
/// leading index is checked against its position. Stored coordinates are
/// ignored, the mesh already has them.
pub fn read_sol(path: &Path, mesh: &mut Mesh) -> Result<f64> {
    let reader = BufReader::new(File::open(path)?);
    let mut time = None;
    let mut row = 0usize;

    for (lineno, line) in reader.lines().enumerate() {
        let lineno = lineno + 1;
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with('#') {
            if let Some(rest) = trimmed.strip_prefix("#time :") {
                time = Some(rest.trim().parse::<f64>().map_err(|_| {
                    IoError::format(lineno, "bad time value in #time header")
                })?);
            }
            continue;
        }

        let fields: Vec<f64> = trimmed
            .split_whitespace()
            .map(|tok| {
                tok.parse::<f64>()
                    .map_err(|_| IoError::format(lineno, format!("bad number `{tok}`")))
            })
            .collect::<Result<_>>()?;
        if fields.len() != 8 {
            return Err(IoError::format(
                lineno,
                format!("expected 8 columns, found {}", fields.len()),
            ));
        }
        if fields[0] as usize != row {
            return Err(IoError::format(
                lineno,
                format!("node index {} where {} was expected", fields[0], row),
            ));
        }
        if row >= mesh.nodes.len() {
            return Err(IoError::format(
                lineno,
                format!("more rows than the mesh has nodes ({})", mesh.nodes.len()),
            ));
        }
        let node = &mut mesh.nodes[row];
        node.set_magnetization(Vector3::new(fields[4], fields[5], fields[6]));
        node.phi = fields[7];
        row += 1;
    }

    if row != mesh.nodes.len() {
        return Err(IoError::format(
            row,
            format!("{} rows for a mesh of {} nodes", row, mesh.nodes.len()),
        ));
    }
    time.ok_or_else(|| IoError::format(0, "missing #time header"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use umag_mesh::Node;

    fn two_node_mesh() -> Mesh {
        let mut mesh = Mesh::default();
        mesh.nodes.push(Node::new(Vector3::new(0.0, 0.0, 0.0)));
        mesh.nodes.push(Node::new(Vector3::new(1e-9, 0.0, 0.0)));
        for n in &mut mesh.nodes {
            n.phi = 0.25;
        }
        mesh.nodes[0].set_magnetization(Vector3::new(0.0, 0.0, 1.0));
        mesh.nodes[1].set_magnetization(Vector3::new(0.6, 0.0, 0.8));
        mesh
    }

    #[test]
    fn snapshot_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.sol");
        let mesh = two_node_mesh();
        write_sol(&path, &mesh, 1e-9, 3.5e-12).unwrap();

        let mut restored = two_node_mesh();
        for n in &mut restored.nodes {
            n.set_magnetization(Vector3::new(1.0, 0.0, 0.0));
            n.phi = 0.0;
        }
        let t = read_sol(&path, &mut restored).unwrap();
        assert!((t - 3.5e-12).abs() < 1e-22);
        assert!((restored.nodes[1].u - mesh.nodes[1].u).norm() < 1e-9);
        assert!((restored.nodes[0].phi - 0.25).abs() < 1e-9);
        // restart state is accepted state
        assert_eq!(restored.nodes[1].u0, restored.nodes[1].u);
    }

    #[test]
    fn rejects_index_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.sol");
        let mesh = two_node_mesh();
        write_sol(&path, &mesh, 1.0, 0.0).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let swapped = text.replacen("\n1\t", "\n7\t", 1);
        std::fs::write(&path, swapped).unwrap();

        let mut m = two_node_mesh();
        assert!(matches!(
            read_sol(&path, &mut m),
            Err(IoError::Format { .. })
        ));
    }

    #[test]
    fn rejects_node_count_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.sol");
        let mesh = two_node_mesh();
        write_sol(&path, &mesh, 1.0, 0.0).unwrap();

        let mut bigger = two_node_mesh();
        bigger.nodes.push(Node::new(Vector3::new(0.0, 1e-9, 0.0)));
        assert!(matches!(
            read_sol(&path, &mut bigger),
            Err(IoError::Format { .. })
        ));
    }

    #[test]
    fn missing_time_header_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.sol");
        std::fs::write(&path, "0\t0 0 0\t0 0 1\t0\n1\t1 0 0\t0 0 1\t0\n").unwrap();
        let mut m = two_node_mesh();
        assert!(read_sol(&path, &mut m).is_err());
    }
}
