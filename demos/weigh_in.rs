use chrono::NaiveDate;
use smartscale::{
    BiologicalSex, BodyCharacteristics, BtleplugRadio, DiscoveryManager, Estimator, Length,
    Result, SessionEvent,
};
use std::{env, sync::Arc};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

/// Usage: weigh_in [HEIGHT_M] [BIRTH_DATE] [male|female]
fn biometrics() -> BodyCharacteristics {
    let args: Vec<String> = env::args().skip(1).collect();

    let height = args
        .first()
        .and_then(|h| h.parse::<f64>().ok())
        .map(Length::meters);
    let birth_date = args
        .get(1)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());
    let biological_sex = match args.get(2).map(String::as_str) {
        Some("male" | "m") => BiologicalSex::Male,
        Some("female" | "f") => BiologicalSex::Female,
        _ => BiologicalSex::Unknown,
    };

    BodyCharacteristics::new(birth_date, height, biological_sex)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("⚖️ Smartscale Weigh-in Example");
    let characteristics = biometrics();

    let radio = Arc::new(BtleplugRadio::new().await?);
    let manager = DiscoveryManager::with_defaults(radio);

    info!("Searching for scales, step on the scale to wake it up...");
    let session = match manager.connect_to_nearby_scale().await {
        Ok(session) => {
            info!("✅ Connected to {} ({})", session.adapter(), session.peer());
            session
        }
        Err(e) => {
            error!("❌ Failed to connect to a scale: {}", e);
            return Err(e);
        }
    };

    let mut events = session.events();
    let measurement = loop {
        match events.recv().await {
            Ok(SessionEvent::Measurement(m)) => println!("  {} ({})", m.weight, m.status),
            Ok(SessionEvent::FinalMeasurement(m)) => break m,
            Ok(SessionEvent::BatteryLevel(level)) => info!("🔋 Battery: {}%", level),
            Ok(SessionEvent::ConnectionChanged(false)) | Err(RecvError::Closed) => {
                // The final reading may have landed before the event was seen
                match session.wait_for_final_measurement().await {
                    Ok(m) => break m,
                    Err(e) => {
                        error!("❌ Scale disconnected before the weigh-in finished");
                        return Err(e);
                    }
                }
            }
            Ok(SessionEvent::ConnectionChanged(true)) => {}
            Err(RecvError::Lagged(skipped)) => warn!("Skipped {} updates", skipped),
        }
    };

    let metrics = Estimator::new().estimate(&measurement, &characteristics, None);

    println!("\n📊 Weigh-in Result");
    println!("┌─────────────────────────────────────────┐");
    println!("│ Weight:        {:>24} │", metrics.body_mass.to_string());
    println!("│ Impedance:     {:>20.1} ohm │", measurement.impedance);
    match metrics.body_mass_index {
        Some(bmi) => println!("│ BMI:           {bmi:>24.1} │"),
        None => println!("│ BMI:           {:>24} │", "height unknown"),
    }
    match (metrics.body_fat_percentage, metrics.lean_body_mass) {
        (Some(fat), Some(lean)) => {
            println!("│ Body fat:      {:>23.1}% │", fat * 100.0);
            println!("│ Lean mass:     {:>24} │", lean.to_string());
        }
        _ => println!("│ Body fat:      {:>24} │", "height/age unknown"),
    }
    if let Some(info) = session.device_info() {
        println!(
            "│ Model:         {:>24} │",
            info.model_number.unwrap_or_default()
        );
    }
    println!("└─────────────────────────────────────────┘");

    if session.is_connected() {
        session.disconnect().await?;
    }

    info!("✅ Done");
    Ok(())
}
