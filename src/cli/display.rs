use console::{style, Style};

use crate::mission::{Mission, MissionStatus, WorkItemStatus};

pub struct Display;

impl Display {
    pub fn new() -> Self {
        Self
    }

    pub fn print_header(&self, text: &str) {
        println!();
        println!("{}", style(text).bold().cyan());
        println!("{}", style("═".repeat(60)).dim());
        println!();
    }

    pub fn print_error(&self, message: &str) {
        eprintln!("{} {}", style("error:").bold().red(), message);
    }

    pub fn print_mission_summary(&self, mission: &Mission) {
        let status_style = self.status_style(mission.status);
        let progress = mission.progress();

        println!(
            "{}  {}",
            style(&mission.mission_id).bold(),
            style(&mission.description).white()
        );
        println!(
            "    Status: {}  Progress: {}",
            status_style.apply_to(mission.status.to_string()),
            progress
        );
        if let Some(url) = &mission.pr.url {
            println!("    PR: {}", style(url).dim());
        }
        println!();
    }

    pub fn print_mission_detail(&self, mission: &Mission) {
        self.print_header(&format!("Mission: {}", mission.mission_id));

        let status_style = self.status_style(mission.status);
        println!("Description: {}", style(&mission.description).white().bold());
        println!(
            "Status:      {}",
            status_style.apply_to(mission.status.to_string())
        );
        println!("Repository:  {}", mission.repo);
        println!("Integration: {}", mission.integration_branch);
        println!(
            "Sessions:    {}/{}",
            mission.safety.session_count, mission.safety.max_sessions
        );
        if let Some(url) = &mission.pr.url {
            println!("PR:          {}", url);
        }

        println!();
        println!("Progress: {}", mission.progress());
        println!();

        for item in &mission.work_items {
            let marker = self.item_marker(item.status);
            let mut line = format!("  {} {} {}", marker, style(&item.id).bold(), item.title);
            if !item.depends_on.is_empty() {
                line.push_str(&format!(
                    " {}",
                    style(format!("(after {})", item.depends_on.join(", "))).dim()
                ));
            }
            if !item.risk_flags.is_empty() {
                let flags: Vec<&str> = item.risk_flags.iter().map(|f| f.as_str()).collect();
                line.push_str(&format!(" {}", style(format!("[{}]", flags.join(","))).yellow()));
            }
            println!("{}", line);
            if let Some(error) = &item.error {
                println!("      {}", style(error).red());
            }
        }
        println!();
    }

    fn item_marker(&self, status: WorkItemStatus) -> String {
        match status {
            WorkItemStatus::Done => style("✔").green().to_string(),
            WorkItemStatus::Failed => style("✖").red().to_string(),
            WorkItemStatus::InProgress => style("●").cyan().to_string(),
            WorkItemStatus::CheckpointPaused => style("⏸").yellow().to_string(),
            WorkItemStatus::Ready => style("○").white().to_string(),
            WorkItemStatus::Blocked => style("·").dim().to_string(),
        }
    }

    fn status_style(&self, status: MissionStatus) -> Style {
        match status {
            MissionStatus::Completed => Style::new().green().bold(),
            MissionStatus::Failed | MissionStatus::Aborted => Style::new().red().bold(),
            MissionStatus::InProgress | MissionStatus::Merging | MissionStatus::Review => {
                Style::new().cyan().bold()
            }
            MissionStatus::CheckpointPaused
            | MissionStatus::PendingApproval
            | MissionStatus::Paused => Style::new().yellow().bold(),
            MissionStatus::Planning => Style::new().white().bold(),
        }
    }
}

impl Default for Display {
    fn default() -> Self {
        Self::new()
    }
}
