//! Time-series log.
//!
//! One row per accepted step: time, volume-averaged magnetization, the
//! fastest nodal rate, the four energy terms and their total, and the step
//! size that produced the row. Plotting tools read it directly.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;

/// One accepted step, ready to append.
#[derive(Debug, Clone, Copy)]
pub struct EvolRow {
    pub time: f64,
    /// Volume-weighted average of the magnetization components.
    pub mean_u: [f64; 3],
    /// Largest nodal rate |v| over the mesh, in 1/s.
    pub vmax: f64,
    /// Exchange, anisotropy, demagnetizing, applied-field energies in J.
    pub energy: [f64; 4],
    pub total_energy: f64,
    pub dt: f64,
}

pub struct EvolWriter {
    out: BufWriter<File>,
}

impl EvolWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let mut out = BufWriter::new(File::create(path)?);
        writeln!(
            out,
            "# t\t<ux>\t<uy>\t<uz>\tvmax\tE_ex\tE_aniso\tE_demag\tE_zeeman\tE_total\tdt"
        )?;
        Ok(EvolWriter { out })
    }

    pub fn append(&mut self, row: &EvolRow) -> Result<()> {
        writeln!(
            self.out,
            "{:+.10e}\t{:+.10e}\t{:+.10e}\t{:+.10e}\t{:+.10e}\t{:+.10e}\t{:+.10e}\t{:+.10e}\t{:+.10e}\t{:+.10e}\t{:+.10e}",
            row.time,
            row.mean_u[0],
            row.mean_u[1],
            row.mean_u[2],
            row.vmax,
            row.energy[0],
            row.energy[1],
            row.energy[2],
            row.energy[3],
            row.total_energy,
            row.dt
        )?;
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_then_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.evol");
        let mut w = EvolWriter::create(&path).unwrap();
        w.append(&EvolRow {
            time: 1e-12,
            mean_u: [0.0, 0.1, 0.99],
            vmax: 2.5e8,
            energy: [1e-19, 0.0, 3e-20, -2e-19],
            total_energy: -7e-20,
            dt: 1e-13,
        })
        .unwrap();
        drop(w);

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("# t\t<ux>"));
        let row = lines.next().unwrap();
        assert_eq!(row.split('\t').count(), 11);
        assert!(row.starts_with("+1.0000000000e-12"));
    }
}
