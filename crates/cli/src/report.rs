//! `report-util` (spec §6): snapshots `screen -ls` to a timestamped file
//! under `reports/`.

use std::io;
use std::path::PathBuf;

use chrono::Local;
use engine::facade::System;

use crate::view::render_screen_ls;

const REPORTS_DIR: &str = "reports";

pub fn write_report(system: &System) -> io::Result<PathBuf> {
    std::fs::create_dir_all(REPORTS_DIR)?;
    let filename = format!(
        "scheduler_report_{}.txt",
        Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let path = PathBuf::from(REPORTS_DIR).join(filename);
    std::fs::write(&path, render_screen_ls(system))?;
    Ok(path)
}
