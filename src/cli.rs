use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "class-booker")]
#[command(about = "Books a club class as soon as its booking window opens")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand, PartialEq)]
pub enum Command {
    /// Log in, find the configured course N days ahead, hold it and pay.
    Book,
    /// Print the adult timetable for a club.
    Timetable {
        /// Club to list; defaults to the configured club.
        #[arg(long)]
        club: Option<u32>,

        /// Also write the timetable as an iCalendar file.
        #[arg(long, value_name = "PATH")]
        ics: Option<PathBuf>,
    },
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Book)
    }
}
