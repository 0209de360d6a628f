use crate::config::Config;
use crate::engine::Engine;
use crate::objective::Objective;
use crate::search::{optimize, sweep};
use anyhow::{Context, Result};
use glob::glob;
use rmp_serde::encode;
use serde::Serialize;
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

/// Simulation directory holding `config.toml` and every output file.
pub struct Manager {
    sim_dir: PathBuf,
    cfg: Config,
}

impl Manager {
    pub fn new<P: AsRef<Path>>(sim_dir: P) -> Result<Self> {
        let sim_dir = sim_dir.as_ref().to_path_buf();

        let cfg =
            Config::from_file(sim_dir.join("config.toml")).context("failed to construct cfg")?;
        log::info!("{cfg:#?}");

        Ok(Self { sim_dir, cfg })
    }

    /// Run the configured schedule once and save the trajectory and its tail summary.
    pub fn simulate(&self) -> Result<()> {
        let engine = self.engine();
        let schedule = self.cfg.schedule().context("failed to build schedule")?;

        let traj = engine
            .run(self.cfg.init.state, &schedule)
            .context("failed to run schedule")?;
        log::info!(
            "simulated {} records over {} generations",
            traj.len(),
            schedule.total_duration()
        );

        let traj_file = self.trajectory_file();
        let file = File::create(&traj_file).with_context(|| format!("failed to create {traj_file:?}"))?;
        let mut writer = BufWriter::new(file);
        encode::write(&mut writer, &traj).context("failed to serialize trajectory")?;
        writer.flush().context("failed to flush writer stream")?;
        log::info!("saved {traj_file:?}");

        let summary = Objective::new(&engine, self.cfg.init.state)
            .summarize(&traj, &schedule)
            .context("failed to summarize trajectory")?;
        log::info!("average MM fraction over the last cycle: {}", summary.mean);

        self.save_report(&self.simulation_file(), &summary)
    }

    /// Search the configured variables for the schedule minimizing the MM fraction.
    pub fn optimize(&self) -> Result<()> {
        let settings = self
            .cfg
            .optimize
            .as_ref()
            .context("config has no [optimize] table")?;
        let engine = self.engine();
        let schedule = self.cfg.schedule().context("failed to build schedule")?;
        let objective = Objective::new(&engine, self.cfg.init.state);

        let report = optimize(&objective, &schedule, settings).context("failed to optimize")?;
        log::info!("{report:#?}");

        self.save_report(&self.optimize_file(), &report)
    }

    /// Evaluate the configured grid of schedule parameters.
    pub fn sweep(&self) -> Result<()> {
        let settings = self
            .cfg
            .sweep
            .as_ref()
            .context("config has no [sweep] table")?;
        let engine = self.engine();
        let schedule = self.cfg.schedule().context("failed to build schedule")?;
        let objective = Objective::new(&engine, self.cfg.init.state);

        let report = sweep(&objective, &schedule, settings).context("failed to sweep")?;
        log::info!("best grid point: {:?}", report.best);

        self.save_report(&self.sweep_file(), &report)
    }

    /// Remove every output file.
    pub fn clean(&self) -> Result<()> {
        for pattern in ["*.msgpack", "*.json"] {
            let pattern = self.sim_dir.join(pattern);
            let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
            for file in glob(pattern).context("failed to glob output files")? {
                let file = file.context("failed to read glob entry")?;
                fs::remove_file(&file).with_context(|| format!("failed to remove {file:?}"))?;
                log::info!("removed {file:?}");
            }
        }
        Ok(())
    }

    fn engine(&self) -> Engine {
        Engine::new(self.cfg.model, self.cfg.solver.clone())
    }

    fn save_report<T: Serialize>(&self, file: &Path, report: &T) -> Result<()> {
        let writer = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let writer = BufWriter::new(writer);
        serde_json::to_writer_pretty(writer, report)
            .with_context(|| format!("failed to write {file:?}"))?;
        log::info!("saved {file:?}");
        Ok(())
    }

    fn trajectory_file(&self) -> PathBuf {
        self.sim_dir.join("trajectory.msgpack")
    }

    fn simulation_file(&self) -> PathBuf {
        self.sim_dir.join("simulation.json")
    }

    fn optimize_file(&self) -> PathBuf {
        self.sim_dir.join("optimize.json")
    }

    fn sweep_file(&self) -> PathBuf {
        self.sim_dir.join("sweep.json")
    }
}
