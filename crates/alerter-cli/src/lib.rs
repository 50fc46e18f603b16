//! Alerter CLI - submit routes, trigger simulations and watch alerts.

use alerter_core::{CorrelationEvent, Point};
use alerter_sdk::AlerterClient;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "alerter", author, version, about)]
pub struct Cli {
    /// Alerter server URL
    #[arg(long, global = true, default_value = "http://localhost:3000")]
    pub url: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Submit a flight route
    SubmitRoute {
        /// Route vertex as LAT,LON (repeat, at least two)
        #[arg(long = "point", value_parser = parse_point, required = true)]
        points: Vec<Point>,
    },
    /// Run one hazard simulation window on the server
    Simulate,
    /// List active routes
    Routes,
    /// Print events from an alert channel until interrupted
    Watch {
        #[arg(long, default_value = "alerts")]
        channel: String,

        /// Only show alerts for this route
        #[arg(long = "route")]
        route_id: Option<String>,
    },
}

/// Parse `LAT,LON`.
pub fn parse_point(raw: &str) -> Result<Point, String> {
    let (lat, lon) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LON, got '{}'", raw))?;
    let lat: f64 = lat
        .trim()
        .parse()
        .map_err(|_| format!("invalid latitude '{}'", lat.trim()))?;
    let lon: f64 = lon
        .trim()
        .parse()
        .map_err(|_| format!("invalid longitude '{}'", lon.trim()))?;
    let point = Point::new(lat, lon);
    point.validate().map_err(|err| err.to_string())?;
    Ok(point)
}

/// One-line rendering of an event for terminal output.
pub fn format_event(event: &CorrelationEvent) -> String {
    match event {
        CorrelationEvent::Hazard {
            hazard_id,
            kind,
            location,
        } => format!(
            "HAZARD {} {} at ({:.4}, {:.4})",
            hazard_id, kind, location.lat, location.lon
        ),
        CorrelationEvent::Alert {
            hazard_id,
            route_id,
            kind,
            location,
        } => format!(
            "ALERT  route {} <- {} {} at ({:.4}, {:.4})",
            route_id, kind, hazard_id, location.lat, location.lon
        ),
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let client = AlerterClient::new(cli.url);

    match cli.command {
        Command::SubmitRoute { points } => {
            let response = client.submit_route(&points).await?;
            println!("Route {} stored", response.route_id);
            println!("Distance: {:.1} km", response.route_distance / 1000.0);
        }
        Command::Simulate => {
            println!("Simulating hazards (this takes the full simulation window)...");
            let response = client.simulate_hazards().await?;
            println!("{} ({} hazards)", response.message, response.hazard_count);
        }
        Command::Routes => {
            let routes = client.list_routes().await?;
            println!("{}", serde_json::to_string_pretty(&routes)?);
        }
        Command::Watch { channel, route_id } => {
            let mut stream = client
                .subscribe(&channel, route_id.as_deref())
                .await
                .with_context(|| format!("subscribing to '{}' at {}", channel, client.base_url()))?;
            println!("Watching '{}' (Ctrl+C to stop)", channel);

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    event = stream.next_event() => match event {
                        Some(Ok(event)) => println!("{}", format_event(&event)),
                        Some(Err(err)) => eprintln!("Skipping unreadable event: {}", err),
                        None => {
                            println!("Channel closed by server");
                            break;
                        }
                    },
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerter_core::HazardKind;

    #[test]
    fn parses_points() {
        assert_eq!(parse_point("51.5,-0.1").unwrap(), Point::new(51.5, -0.1));
        assert_eq!(parse_point(" 51.6 , 0.0 ").unwrap(), Point::new(51.6, 0.0));
        assert!(parse_point("51.5").is_err());
        assert!(parse_point("north,west").is_err());
        assert!(parse_point("91,0").is_err());
    }

    #[test]
    fn parses_submit_route_arguments() {
        let cli = Cli::try_parse_from([
            "alerter",
            "--url",
            "http://alerter:3000",
            "submit-route",
            "--point",
            "51.5,-0.1",
            "--point",
            "51.6,0.0",
        ])
        .unwrap();

        assert_eq!(cli.url, "http://alerter:3000");
        match cli.command {
            Command::SubmitRoute { points } => assert_eq!(points.len(), 2),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn watch_defaults_to_alerts_channel() {
        let cli = Cli::try_parse_from(["alerter", "watch", "--route", "r-1"]).unwrap();
        match cli.command {
            Command::Watch { channel, route_id } => {
                assert_eq!(channel, "alerts");
                assert_eq!(route_id.as_deref(), Some("r-1"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn formats_alerts_with_route() {
        let event = CorrelationEvent::Alert {
            hazard_id: "h-1".into(),
            route_id: "r-1".into(),
            kind: HazardKind::BirdActivity,
            location: Point::new(51.55, -0.05),
        };
        assert_eq!(
            format_event(&event),
            "ALERT  route r-1 <- Bird Activity h-1 at (51.5500, -0.0500)"
        );
    }
}
