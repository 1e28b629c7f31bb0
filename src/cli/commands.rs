use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "armada")]
#[command(author, version, about = "Mission orchestrator for autonomous coding agents", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Repository name under the projects directory
    #[arg(short, long, global = true, env = "ARMADA_REPO")]
    pub repo: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default config.toml for a repository
    Init,

    /// Plan and run a new mission
    Run {
        /// Mission description
        description: String,

        /// Skip the approval gate and execute immediately
        #[arg(short, long)]
        yes: bool,
    },

    /// Show mission status
    Status {
        /// Mission ID (defaults to the latest mission)
        mission_id: Option<String>,
    },

    /// List all missions for the repository
    List,

    /// Approve a mission awaiting approval and execute it
    Approve {
        /// Mission ID (defaults to the latest mission)
        mission_id: Option<String>,
    },

    /// Resume a mission paused at a checkpoint
    Resume {
        /// Mission ID (defaults to the latest mission)
        mission_id: Option<String>,
    },

    /// Re-enter a mission an interrupted run left in progress
    Recover {
        /// Mission ID (defaults to the latest mission)
        mission_id: Option<String>,
    },

    /// Abort a mission and clean up its workspaces
    Abort {
        /// Mission ID (defaults to the latest mission)
        mission_id: Option<String>,
    },

    /// Show the state of a mission's pull request
    PrStatus {
        /// Mission ID (defaults to the latest mission)
        mission_id: Option<String>,
    },

    /// Run a health patrol pass
    Patrol {
        /// Mission ID (defaults to the latest mission)
        mission_id: Option<String>,

        /// Keep patrolling all in-progress missions on the configured interval
        #[arg(short, long)]
        watch: bool,
    },

    /// After the pull request merges: delete mission branches and
    /// worktrees and mark the mission completed
    Cleanup {
        /// Mission ID (defaults to the latest mission)
        mission_id: Option<String>,
    },
}
