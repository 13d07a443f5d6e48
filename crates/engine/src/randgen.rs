//! Random instruction and memory-demand generation, shared by `screen -s`
//! and the batch generator (spec §4.5, §6).

use rand::Rng;

use crate::process::ParsedCommand;

const VARS: [&str; 3] = ["x", "y", "z"];

/// Builds a random, always-valid program of `[min_ins, max_ins]`
/// instructions (clamped to the 1-50 bound that also governs `screen -c`,
/// spec §6).
pub fn random_program(min_ins: u32, max_ins: u32) -> Vec<ParsedCommand> {
    let mut rng = rand::thread_rng();
    let lo = min_ins.max(1).min(50);
    let hi = max_ins.max(lo).min(50);
    let count = if lo >= hi { lo } else { rng.gen_range(lo..=hi) };

    (0..count)
        .map(|line| random_instruction(&mut rng, line as usize))
        .collect()
}

fn random_instruction(rng: &mut impl Rng, line: usize) -> ParsedCommand {
    let var = || VARS[rng.gen_range(0..VARS.len())].to_string();
    match rng.gen_range(0..5) {
        0 => ParsedCommand::Print {
            message: format!("\"hello from {}\"", var()),
            line,
        },
        1 => ParsedCommand::Declare {
            var: var(),
            value: rng.gen_range(0..=u16::MAX),
            line,
        },
        2 => ParsedCommand::Add {
            dst: var(),
            a: var(),
            b: rng.gen_range(0..100).to_string(),
            line,
        },
        3 => ParsedCommand::Subtract {
            dst: var(),
            a: var(),
            b: rng.gen_range(0..100).to_string(),
            line,
        },
        _ => ParsedCommand::Sleep {
            ticks: rng.gen_range(0..5),
            line,
        },
    }
}

/// Draws a memory demand uniformly from the configured range (spec §4.5).
pub fn random_memory_demand(min_mem: u32, max_mem: u32) -> u32 {
    let mut rng = rand::thread_rng();
    if min_mem >= max_mem {
        min_mem
    } else {
        rng.gen_range(min_mem..=max_mem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_program_respects_bounds() {
        for _ in 0..20 {
            let program = random_program(2, 6);
            assert!(program.len() >= 2 && program.len() <= 6);
        }
    }

    #[test]
    fn random_program_clamps_above_fifty() {
        let program = random_program(60, 80);
        assert!(program.len() <= 50);
    }
}
