//! Parses the instruction-language source text (`screen -c`'s `"i1; i2; …"`
//! argument, spec §6) into a flat `Vec<ParsedCommand>`.
//!
//! Grammar, one instruction per `;`-separated clause, keyword first:
//!
//! ```text
//! PRINT <piece> ('+' <piece>)*      piece := "quoted text" | variable
//! DECLARE <var> <u16>
//! ADD <dst> <a> <b>
//! SUBTRACT <dst> <a> <b>
//! SLEEP <ticks>
//! FOR <var> <start> <end> <step>
//! END_FOR
//! WRITE <addr> <src>
//! READ <dst> <addr>
//! ```

use thiserror::Error;

use super::ParsedCommand;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProgramParseError {
    #[error("program has no instructions")]
    Empty,
    #[error("program has {0} instructions, which exceeds the limit of 50")]
    TooManyInstructions(usize),
    #[error("instruction {index}: unknown keyword `{keyword}`")]
    UnknownKeyword { index: usize, keyword: String },
    #[error("instruction {index}: `{keyword}` requires {expected} argument(s), got {got}")]
    WrongArity {
        index: usize,
        keyword: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("instruction {index}: `{value}` is not a valid integer")]
    InvalidNumber { index: usize, value: String },
}

/// Parses `"<i1; i2; …>"` body text into an ordered instruction list.
pub fn parse_program(source: &str) -> Result<Vec<ParsedCommand>, ProgramParseError> {
    let clauses: Vec<&str> = source
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if clauses.is_empty() {
        return Err(ProgramParseError::Empty);
    }
    if clauses.len() > 50 {
        return Err(ProgramParseError::TooManyInstructions(clauses.len()));
    }

    clauses
        .iter()
        .enumerate()
        .map(|(line, clause)| parse_instruction(line, clause))
        .collect()
}

fn parse_instruction(line: usize, clause: &str) -> Result<ParsedCommand, ProgramParseError> {
    let mut tokens = clause.splitn(2, char::is_whitespace);
    let keyword = tokens.next().unwrap_or_default().to_uppercase();
    let rest = tokens.next().unwrap_or("").trim();
    let args: Vec<&str> = if rest.is_empty() {
        Vec::new()
    } else {
        rest.split_whitespace().collect()
    };

    match keyword.as_str() {
        "PRINT" => Ok(ParsedCommand::Print {
            message: rest.to_string(),
            line,
        }),
        "DECLARE" => {
            require_arity(line, "DECLARE", 2, args.len())?;
            Ok(ParsedCommand::Declare {
                var: args[0].to_string(),
                value: parse_int::<u16>(line, args[1])?,
                line,
            })
        }
        "ADD" => {
            require_arity(line, "ADD", 3, args.len())?;
            Ok(ParsedCommand::Add {
                dst: args[0].to_string(),
                a: args[1].to_string(),
                b: args[2].to_string(),
                line,
            })
        }
        "SUBTRACT" => {
            require_arity(line, "SUBTRACT", 3, args.len())?;
            Ok(ParsedCommand::Subtract {
                dst: args[0].to_string(),
                a: args[1].to_string(),
                b: args[2].to_string(),
                line,
            })
        }
        "SLEEP" => {
            require_arity(line, "SLEEP", 1, args.len())?;
            Ok(ParsedCommand::Sleep {
                ticks: parse_int::<u64>(line, args[0])?,
                line,
            })
        }
        "FOR" => {
            require_arity(line, "FOR", 4, args.len())?;
            Ok(ParsedCommand::For {
                var: args[0].to_string(),
                start: parse_int::<i64>(line, args[1])?,
                end: parse_int::<i64>(line, args[2])?,
                step: parse_int::<i64>(line, args[3])?,
                line,
            })
        }
        "END_FOR" | "ENDFOR" => Ok(ParsedCommand::EndFor { line }),
        "WRITE" => {
            require_arity(line, "WRITE", 2, args.len())?;
            Ok(ParsedCommand::Write {
                addr: args[0].to_string(),
                src: args[1].to_string(),
                line,
            })
        }
        "READ" => {
            require_arity(line, "READ", 2, args.len())?;
            Ok(ParsedCommand::Read {
                dst: args[0].to_string(),
                addr: args[1].to_string(),
                line,
            })
        }
        other => Err(ProgramParseError::UnknownKeyword {
            index: line,
            keyword: other.to_string(),
        }),
    }
}

fn require_arity(
    line: usize,
    keyword: &'static str,
    expected: usize,
    got: usize,
) -> Result<(), ProgramParseError> {
    if got != expected {
        return Err(ProgramParseError::WrongArity {
            index: line,
            keyword,
            expected,
            got,
        });
    }
    Ok(())
}

fn parse_int<T: std::str::FromStr>(line: usize, value: &str) -> Result<T, ProgramParseError> {
    value
        .parse::<T>()
        .map_err(|_| ProgramParseError::InvalidNumber {
            index: line,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_simple_program() {
        let prog = parse_program("DECLARE x 7; ADD y x 3; PRINT y; SLEEP 2").unwrap();
        assert_eq!(prog.len(), 4);
        assert!(matches!(prog[0], ParsedCommand::Declare { value: 7, .. }));
        assert!(matches!(prog[3], ParsedCommand::Sleep { ticks: 2, .. }));
    }

    #[test]
    fn parses_nested_for_loops() {
        let prog =
            parse_program("FOR i 1 3 1; FOR j 1 2 1; PRINT i+j; END_FOR; END_FOR").unwrap();
        assert_eq!(prog.len(), 5);
        assert!(matches!(prog[0], ParsedCommand::For { ref var, .. } if var == "i"));
        assert!(matches!(prog[4], ParsedCommand::EndFor { .. }));
    }

    #[test]
    fn rejects_unknown_keyword() {
        let err = parse_program("FROB x").unwrap_err();
        assert!(matches!(err, ProgramParseError::UnknownKeyword { .. }));
    }

    #[test]
    fn rejects_wrong_arity() {
        let err = parse_program("ADD x y").unwrap_err();
        assert!(matches!(err, ProgramParseError::WrongArity { .. }));
    }

    #[test]
    fn rejects_more_than_fifty_instructions() {
        let body = (0..51)
            .map(|_| "PRINT x".to_string())
            .collect::<Vec<_>>()
            .join("; ");
        let err = parse_program(&body).unwrap_err();
        assert!(matches!(err, ProgramParseError::TooManyInstructions(51)));
    }

    #[test]
    fn rejects_empty_program() {
        assert_eq!(parse_program("   ").unwrap_err(), ProgramParseError::Empty);
    }
}
