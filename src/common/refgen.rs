// src/common/refgen.rs
//
// Numeração diária legível por humanos: {PREFIX}-{DDMMYY}-{SEQ:04} e a
// variante com código de tipo {PREFIX}-{DDMMYY}-{K}-{SEQ:04}. A sequência é
// sempre re-derivada varrendo as referências existentes do dia (sob lock de
// linha, feito pelo repositório), nunca lida de uma tabela de contador à
// parte: o histórico sofre reescritas manuais e a varredura as tolera.

use chrono::NaiveDate;

/// Prefixo do dia, ex.: "WH-RQ-160825-".
pub fn daily_prefix(prefix: &str, date: NaiveDate) -> String {
    format!("{}-{}-", prefix, date.format("%d%m%y"))
}

/// Variante com código de tipo, ex.: "WH-160825-P-".
pub fn daily_prefix_with_kind(prefix: &str, date: NaiveDate, kind: char) -> String {
    format!("{}-{}-{}-", prefix, date.format("%d%m%y"), kind)
}

/// Extrai a sequência do último segmento de uma referência ("…-0042" -> 42).
/// Referências malformadas contam como 0.
pub fn parse_sequence(reference: &str) -> u32 {
    reference
        .rsplit('-')
        .next()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(0)
}

/// Próxima referência para um prefixo dado o conjunto já existente:
/// max(sequências) + 1, com zero à esquerda.
pub fn next_reference(prefix: &str, existing: &[String]) -> String {
    let max_seq = existing.iter().map(|r| parse_sequence(r)).max().unwrap_or(0);
    format!("{}{:04}", prefix, max_seq + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn prefix_formats_ddmmyy() {
        assert_eq!(daily_prefix("WH-RQ", d(2025, 8, 16)), "WH-RQ-160825-");
        assert_eq!(daily_prefix_with_kind("WH", d(2025, 8, 16), 'P'), "WH-160825-P-");
    }

    #[test]
    fn first_reference_of_the_day() {
        assert_eq!(next_reference("WH-RQ-160825-", &[]), "WH-RQ-160825-0001");
    }

    #[test]
    fn sequence_takes_max_not_count() {
        let existing = vec![
            "WH-RQ-160825-0001".to_string(),
            "WH-RQ-160825-0007".to_string(),
            "WH-RQ-160825-0003".to_string(),
        ];
        assert_eq!(next_reference("WH-RQ-160825-", &existing), "WH-RQ-160825-0008");
    }

    #[test]
    fn malformed_references_count_as_zero() {
        let existing = vec!["WH-RQ-160825-ABC".to_string(), "garbage".to_string()];
        assert_eq!(next_reference("WH-RQ-160825-", &existing), "WH-RQ-160825-0001");
    }

    #[test]
    fn parse_sequence_reads_last_segment() {
        assert_eq!(parse_sequence("AD-140825-P-0042"), 42);
        assert_eq!(parse_sequence(""), 0);
    }
}
