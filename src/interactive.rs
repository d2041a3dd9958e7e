//! Interactive single-event creation.
//!
//! Prompts field by field, re-asking on invalid input instead of bailing,
//! then shows a summary and asks for confirmation before anything is sent.
//! The prompt loop is generic over its input/output streams so tests can
//! script a whole session.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use chrono::Local;
use colored::Colorize;

use crate::config::{MAX_ANNOTATION_LEN, MAX_EVENT_NAME_LEN, MAX_IP_LIST_LEN};
use crate::event::{is_valid_date, parse_port, split_multi, EventRecord, Target, Tlp};
use crate::misp::{MispApi, SubmissionClient};

pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Prompter { input, output }
    }

    fn ask(&mut self, prompt: &str) -> io::Result<String> {
        write!(self.output, "{prompt}")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "input closed",
            ));
        }
        Ok(line.trim().to_string())
    }

    fn complain(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.output, "  {message}")
    }

    fn ask_event_name(&mut self) -> io::Result<String> {
        loop {
            let name = self.ask("Event name: ")?;
            if name.is_empty() {
                self.complain("Event name is required")?;
            } else if name.chars().count() > MAX_EVENT_NAME_LEN {
                self.complain(&format!("Must be at most {MAX_EVENT_NAME_LEN} characters"))?;
            } else {
                return Ok(name);
            }
        }
    }

    fn ask_date(&mut self) -> io::Result<String> {
        let today = Local::now().format("%Y-%m-%d").to_string();
        loop {
            let date = self.ask(&format!("Event date [{today}]: "))?;
            if date.is_empty() {
                return Ok(today);
            }
            if is_valid_date(&date) {
                return Ok(date);
            }
            self.complain("Use YYYY-MM-DD or YYYY-MM-DD HH:MM:SS")?;
        }
    }

    fn ask_annotation(&mut self) -> io::Result<String> {
        loop {
            let text = self.ask("Description: ")?;
            if text.is_empty() {
                self.complain("Description is required")?;
            } else if text.chars().count() > MAX_ANNOTATION_LEN {
                self.complain(&format!("Must be at most {MAX_ANNOTATION_LEN} characters"))?;
            } else {
                return Ok(text);
            }
        }
    }

    /// Collects IPs one per line until a blank line. `required` keeps
    /// asking until at least one valid address is in.
    fn ask_ip_list(&mut self, label: &str, required: bool) -> io::Result<Vec<std::net::IpAddr>> {
        writeln!(
            self.output,
            "{label} (one per line, blank line to finish):"
        )?;
        let mut ips = Vec::new();
        loop {
            let line = self.ask("> ")?;
            if line.is_empty() {
                if ips.is_empty() && required {
                    self.complain("At least one IP is required")?;
                    continue;
                }
                return Ok(ips);
            }
            if ips.len() >= MAX_IP_LIST_LEN {
                self.complain(&format!("At most {MAX_IP_LIST_LEN} IPs; finishing list"))?;
                return Ok(ips);
            }
            match line.parse::<std::net::IpAddr>() {
                Ok(ip) => ips.push(ip),
                Err(_) => self.complain(&format!("'{line}' is not a valid IP address"))?,
            }
        }
    }

    fn ask_ports(&mut self) -> io::Result<Vec<u16>> {
        loop {
            let line = self.ask("Destination ports (semicolon-separated, optional): ")?;
            if line.is_empty() {
                return Ok(Vec::new());
            }
            let segments = split_multi(&line);
            let ports: Vec<u16> = segments.iter().filter_map(|s| parse_port(s)).collect();
            if ports.len() == segments.len() {
                return Ok(ports);
            }
            self.complain("Ports must be numbers in range 1-65535")?;
        }
    }

    fn ask_tlp(&mut self) -> io::Result<Tlp> {
        loop {
            let choice = self.ask("TLP level: 1) clear 2) green 3) amber 4) red [2]: ")?;
            match choice.as_str() {
                "" | "2" => return Ok(Tlp::Green),
                "1" => return Ok(Tlp::Clear),
                "3" => return Ok(Tlp::Amber),
                "4" => return Ok(Tlp::Red),
                other => self.complain(&format!("'{other}' is not a choice between 1 and 4"))?,
            }
        }
    }

    /// Runs the whole prompt sequence. Returns `None` when the analyst
    /// declines the final confirmation.
    pub fn collect_event(&mut self) -> io::Result<Option<EventRecord>> {
        let event_name = self.ask_event_name()?;
        let event_date = self.ask_date()?;
        let annotation = self.ask_annotation()?;
        let attacker_ips = self.ask_ip_list("Attacker IPs", true)?;
        let destination_ips = self.ask_ip_list("Destination IPs", false)?;
        let destination_ports = self.ask_ports()?;
        let tlp = self.ask_tlp()?;

        let record = EventRecord {
            event_name,
            event_date,
            attacker_ips,
            target: Target::Destinations {
                ips: destination_ips,
                ports: destination_ports,
            },
            annotation,
            tlp,
        };

        writeln!(self.output, "\nEvent summary:")?;
        writeln!(self.output, "  Name:         {}", record.event_name)?;
        writeln!(self.output, "  Date:         {}", record.event_date)?;
        writeln!(self.output, "  TLP:          {}", record.tlp)?;
        writeln!(
            self.output,
            "  Attacker IPs: {}",
            join_ips(&record.attacker_ips)
        )?;
        if let Target::Destinations { ips, ports } = &record.target {
            if !ips.is_empty() {
                writeln!(self.output, "  Destinations: {}", join_ips(ips))?;
            }
            if !ports.is_empty() {
                let rendered: Vec<String> = ports.iter().map(u16::to_string).collect();
                writeln!(self.output, "  Ports:        {}", rendered.join("; "))?;
            }
        }
        writeln!(self.output, "  Description:  {}", record.annotation)?;

        let confirm = self.ask("\nCreate this event? [y/N]: ")?;
        if confirm.eq_ignore_ascii_case("y") || confirm.eq_ignore_ascii_case("yes") {
            Ok(Some(record))
        } else {
            Ok(None)
        }
    }
}

fn join_ips(ips: &[std::net::IpAddr]) -> String {
    let rendered: Vec<String> = ips.iter().map(|ip| ip.to_string()).collect();
    rendered.join("; ")
}

/// Runs the `interactive` command against stdin/stdout.
pub async fn run_interactive<A: MispApi>(client: &SubmissionClient<A>) -> Result<i32> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let record = {
        let mut prompter = Prompter::new(stdin.lock(), stdout.lock());
        prompter.collect_event().context("reading event details")?
    };

    let Some(record) = record else {
        println!("Aborted, nothing was created.");
        return Ok(0);
    };

    let submitted = client
        .submit(&record)
        .await
        .context("failed to create event")?;
    println!("{} id {} (uuid {})", "Event created:".green(), submitted.id, submitted.uuid);
    println!("  {}", submitted.url);
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn session(lines: &[&str]) -> (io::Result<Option<EventRecord>>, String) {
        let input = Cursor::new(lines.join("\n") + "\n");
        let mut output = Vec::new();
        let result = Prompter::new(input, &mut output).collect_event();
        (result, String::from_utf8(output).unwrap())
    }

    #[test]
    fn full_session_builds_record() {
        let (result, _out) = session(&[
            "SYN flood against portal",
            "2024-01-15",
            "Sustained flood from botnet",
            "192.0.2.1",
            "192.0.2.2",
            "", // end attacker IPs
            "198.51.100.7",
            "", // end destination IPs
            "443",
            "3",
            "y",
        ]);
        let record = result.unwrap().expect("confirmed");
        assert_eq!(record.event_name, "SYN flood against portal");
        assert_eq!(record.attacker_ips.len(), 2);
        assert_eq!(record.tlp, Tlp::Amber);
        assert_eq!(
            record.target,
            Target::Destinations {
                ips: vec!["198.51.100.7".parse().unwrap()],
                ports: vec![443],
            }
        );
    }

    #[test]
    fn invalid_input_is_reprompted_not_fatal() {
        let (result, out) = session(&[
            "", // name required
            "Attack",
            "not-a-date",
            "2024-01-15",
            "Description",
            "not-an-ip",
            "",           // blank but no IPs yet
            "192.0.2.1",
            "",
            "",
            "70000", // bad port
            "",
            "5", // bad tlp choice
            "",  // default green
            "y",
        ]);
        let record = result.unwrap().expect("confirmed");
        assert_eq!(record.event_name, "Attack");
        assert_eq!(record.tlp, Tlp::Green);
        assert!(out.contains("Event name is required"));
        assert!(out.contains("not a valid IP address"));
        assert!(out.contains("At least one IP is required"));
        assert!(out.contains("1-65535"));
    }

    #[test]
    fn declining_confirmation_returns_none() {
        let (result, out) = session(&[
            "Attack",
            "2024-01-15",
            "Description",
            "192.0.2.1",
            "",
            "",
            "",
            "",
            "n",
        ]);
        assert!(result.unwrap().is_none());
        assert!(out.contains("Event summary:"));
    }

    #[test]
    fn empty_date_defaults_to_today() {
        let (result, _out) = session(&[
            "Attack",
            "",
            "Description",
            "192.0.2.1",
            "",
            "",
            "",
            "",
            "y",
        ]);
        let record = result.unwrap().expect("confirmed");
        assert!(is_valid_date(&record.event_date));
    }

    #[test]
    fn closed_input_is_an_error_not_a_hang() {
        let input = Cursor::new("");
        let mut output = Vec::new();
        let result = Prompter::new(input, &mut output).collect_event();
        assert!(result.is_err());
    }
}
