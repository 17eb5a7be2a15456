use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::Local;
use umag_io::settings::Settings;
use umag_io::{write_sol, EvolRow, EvolWriter, IoError, VtkWriter};
use umag_solver::{Simulation, Snapshot, TimeStepper};

fn usage() {
    eprintln!("usage: umag [--verbose] <settings.json>");
}

fn banner() {
    println!("umag {}", env!("CARGO_PKG_VERSION"));
    println!("finite-element micromagnetics on tetrahedral meshes");
    println!("started {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
}

fn main() -> ExitCode {
    let mut verbose = false;
    let mut settings_path: Option<PathBuf> = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--verbose" | "-v" => verbose = true,
            "--help" | "-h" => {
                usage();
                return ExitCode::SUCCESS;
            }
            _ if settings_path.is_none() => settings_path = Some(PathBuf::from(arg)),
            _ => {
                usage();
                return ExitCode::from(2);
            }
        }
    }
    let Some(settings_path) = settings_path else {
        usage();
        return ExitCode::from(2);
    };

    banner();
    let settings = match Settings::from_file(&settings_path) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("settings error: {err}");
            return ExitCode::from(1);
        }
    };
    println!("settings loaded from {}", settings_path.display());
    if verbose {
        match serde_json::to_string_pretty(&settings) {
            Ok(text) => println!("effective settings:\n{text}"),
            Err(err) => eprintln!("settings echo failed: {err}"),
        }
    }

    let started = Local::now();
    match run(&settings, verbose) {
        Ok(steps) => {
            let elapsed = Local::now() - started;
            println!(
                "done: {steps} accepted steps in {:.3} s",
                elapsed.num_milliseconds() as f64 / 1e3
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("run failed: {err}");
            ExitCode::from(1)
        }
    }
}

fn run(settings: &Settings, verbose: bool) -> umag_solver::Result<u64> {
    let mut sim = Simulation::from_settings(settings)?;
    if verbose {
        let stats = sim.mesh.statistics()?;
        println!(
            "mesh: {} nodes, {} tetrahedra, {} boundary triangles",
            stats.num_nodes, stats.num_volume_elements, stats.num_surface_elements
        );
        println!(
            "body: volume {:.6e} m^3, extent {:.6e} m, demag sources {}",
            sim.volume,
            stats.diameter,
            sim.demag.source_count()
        );
    }
    if sim.start_time > 0.0 {
        println!("restarting at t = {:+.10e} s", sim.start_time);
    }

    let out = &settings.outputs;
    std::fs::create_dir_all(&out.directory).map_err(IoError::from)?;
    let base = out.directory.join(&out.file_basename);
    let mut evol = EvolWriter::create(&with_extension(&base, "evol"))?;

    // the demag potential belongs in the first snapshot even before any
    // step has run
    sim.compute_demag(Snapshot::Current)?;

    let hext = nalgebra::Vector3::from(settings.applied_field);
    let mut stepper = TimeStepper::new(settings, sim.start_time);
    let mut accepted: u64 = 0;

    while !stepper.finished() {
        let outcome = stepper.step(&mut sim)?;
        accepted += 1;

        let energy = sim.energies(&hext)?;
        let mean = sim.mean_magnetization();
        evol.append(&EvolRow {
            time: outcome.time,
            mean_u: [mean.x, mean.y, mean.z],
            vmax: outcome.vmax,
            energy,
            total_energy: energy.iter().sum(),
            dt: outcome.dt,
        })?;

        if verbose {
            println!(
                "t = {:+.6e} s  dt = {:.3e}  du = {:.3e}  {} iterations",
                outcome.time, outcome.dt, outcome.du, outcome.solve.iterations
            );
        }

        if out.save_period > 0 && accepted % out.save_period as u64 == 0 {
            save_snapshot(&sim, settings, &base, accepted, outcome.time)?;
        }
    }

    save_snapshot(&sim, settings, &base, accepted, stepper.time())?;
    Ok(accepted)
}

fn save_snapshot(
    sim: &Simulation,
    settings: &Settings,
    base: &Path,
    iteration: u64,
    time: f64,
) -> umag_solver::Result<()> {
    let stem = format!(
        "{}_{iteration:06}",
        base.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "run".to_string())
    );
    let dir = base.parent().unwrap_or_else(|| Path::new("."));
    let sol = dir.join(format!("{stem}.sol"));
    write_sol(&sol, &sim.mesh, settings.mesh.scaling_factor, time)?;
    if settings.outputs.vtk {
        let vtk = dir.join(format!("{stem}.vtk"));
        VtkWriter::new(&sim.mesh).write(&vtk, time)?;
    }
    Ok(())
}

fn with_extension(base: &Path, ext: &str) -> PathBuf {
    let mut path = base.to_path_buf();
    path.set_extension(ext);
    path
}
