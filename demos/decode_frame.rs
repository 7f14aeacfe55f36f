use smartscale::protocol::{self, RawFrame};
use std::env;

fn parse_hex(input: &str) -> Option<Vec<u8>> {
    let digits: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
        .collect();
    if digits.len() % 2 != 0 {
        return None;
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).ok())
        .collect()
}

fn main() {
    let frames: Vec<String> = env::args().skip(1).collect();
    if frames.is_empty() {
        eprintln!("Usage: decode_frame <HEX>...");
        eprintln!("Example: decode_frame CF:88:13:48:19:00:00:00:00:00:00");
        std::process::exit(2);
    }

    for input in &frames {
        let Some(bytes) = parse_hex(input) else {
            println!("{input}: not a hex string");
            continue;
        };

        match (RawFrame::parse(&bytes), protocol::decode(&bytes)) {
            (Some(raw), Some(measurement)) => {
                println!(
                    "{input}: {} | {:.1} ohm | {} | reserved {:02X?} | checksum {:02X} (byte-sum {:02X})",
                    measurement.weight,
                    measurement.impedance,
                    measurement.status,
                    raw.reserved,
                    raw.checksum,
                    raw.checksum_hint()
                );
            }
            _ => println!("{input}: not a measurement frame ({} bytes)", bytes.len()),
        }
    }
}
