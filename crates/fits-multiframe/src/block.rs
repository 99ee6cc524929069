/// FITS block size in bytes (each logical record is one block).
pub const BLOCK_SIZE: usize = 2880;

/// FITS card (keyword record) size in bytes.
pub const CARD_SIZE: usize = 80;

/// Number of cards that fit in a single block.
pub const CARDS_PER_BLOCK: usize = BLOCK_SIZE / CARD_SIZE;

/// Padding byte used for header blocks (ASCII space).
pub const HEADER_PAD_BYTE: u8 = 0x20;

/// Padding byte used for data blocks (zero).
pub const DATA_PAD_BYTE: u8 = 0x00;

/// Returns the number of FITS blocks required to hold `num_bytes` bytes.
///
/// 0 bytes requires 0 blocks, 1 byte requires 1 block, 2880 bytes requires
/// 1 block, 2881 bytes requires 2 blocks, etc.
pub const fn blocks_needed(num_bytes: u64) -> u64 {
    if num_bytes == 0 {
        return 0;
    }
    num_bytes.div_ceil(BLOCK_SIZE as u64)
}

/// Returns the total byte length (in whole blocks) required to hold `num_bytes`.
pub const fn padded_byte_len(num_bytes: u64) -> u64 {
    blocks_needed(num_bytes) * BLOCK_SIZE as u64
}

/// Like [`padded_byte_len`], but `None` when the padded length overflows.
pub const fn checked_padded_byte_len(num_bytes: u64) -> Option<u64> {
    blocks_needed(num_bytes).checked_mul(BLOCK_SIZE as u64)
}

/// Number of padding bytes that follow `num_bytes` of content to reach the
/// next block boundary.
pub const fn padding_len(num_bytes: u64) -> u64 {
    padded_byte_len(num_bytes) - num_bytes
}

/// Lays out header records as complete header blocks.
///
/// Every record is written into its own 80-byte slot, an `END` card is
/// appended, and the final block is padded with ASCII spaces. Records are
/// expected to be exactly [`CARD_SIZE`] bytes; shorter ones are space
/// padded, longer ones are cut at the card boundary.
pub fn header_blocks<'a, I>(records: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut buf = Vec::new();
    for record in records {
        push_card(&mut buf, record.as_bytes());
    }
    push_card(&mut buf, b"END");

    let total = padded_byte_len(buf.len() as u64) as usize;
    buf.resize(total, HEADER_PAD_BYTE);
    buf
}

fn push_card(buf: &mut Vec<u8>, record: &[u8]) {
    let len = record.len().min(CARD_SIZE);
    buf.extend_from_slice(&record[..len]);
    buf.resize(buf.len() + (CARD_SIZE - len), HEADER_PAD_BYTE);
}

/// Returns `true` when the 80-byte slot holds the `END` card.
pub fn is_end_card(card: &[u8]) -> bool {
    card.len() >= 8 && &card[..8] == b"END     "
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- blocks_needed ----

    #[test]
    fn blocks_needed_zero() {
        assert_eq!(blocks_needed(0), 0);
    }

    #[test]
    fn blocks_needed_partial() {
        assert_eq!(blocks_needed(1), 1);
        assert_eq!(blocks_needed(2879), 1);
        assert_eq!(blocks_needed(2880), 1);
        assert_eq!(blocks_needed(2881), 2);
        assert_eq!(blocks_needed(5761), 3);
    }

    // ---- padded_byte_len / padding_len ----

    #[test]
    fn padded_byte_len_aligned() {
        assert_eq!(padded_byte_len(BLOCK_SIZE as u64), BLOCK_SIZE as u64);
        assert_eq!(padded_byte_len(0), 0);
    }

    #[test]
    fn padding_len_unaligned() {
        assert_eq!(padding_len(100), BLOCK_SIZE as u64 - 100);
        assert_eq!(padding_len(BLOCK_SIZE as u64), 0);
        assert_eq!(padding_len(0), 0);
    }

    #[test]
    fn checked_padded_byte_len_overflow() {
        assert_eq!(checked_padded_byte_len(100), Some(BLOCK_SIZE as u64));
        assert_eq!(checked_padded_byte_len(0), Some(0));
        assert_eq!(checked_padded_byte_len(u64::MAX), None);
        assert_eq!(checked_padded_byte_len(i64::MAX as u64 * 2), None);
    }

    #[test]
    fn constant_relationships() {
        assert_eq!(CARDS_PER_BLOCK, 36);
        assert_eq!(CARDS_PER_BLOCK * CARD_SIZE, BLOCK_SIZE);
    }

    // ---- header_blocks ----

    #[test]
    fn header_blocks_appends_end_and_pads() {
        let buf = header_blocks(["SIMPLE  =                    T"]);
        assert_eq!(buf.len(), BLOCK_SIZE);
        assert_eq!(&buf[..6], b"SIMPLE");
        assert!(is_end_card(&buf[CARD_SIZE..2 * CARD_SIZE]));
        assert!(buf[2 * CARD_SIZE..].iter().all(|&b| b == HEADER_PAD_BYTE));
    }

    #[test]
    fn header_blocks_spills_into_second_block() {
        let records: Vec<String> = (0..CARDS_PER_BLOCK)
            .map(|i| format!("KEY{i:<5}=                    {i}"))
            .collect();
        let buf = header_blocks(records.iter().map(String::as_str));
        assert_eq!(buf.len(), 2 * BLOCK_SIZE);
        assert!(is_end_card(&buf[BLOCK_SIZE..BLOCK_SIZE + CARD_SIZE]));
    }

    #[test]
    fn header_blocks_empty_header_is_one_block() {
        let buf = header_blocks(std::iter::empty());
        assert_eq!(buf.len(), BLOCK_SIZE);
        assert!(is_end_card(&buf[..CARD_SIZE]));
    }

    #[test]
    fn end_card_detection() {
        assert!(is_end_card(b"END                 "));
        assert!(!is_end_card(b"ENDX    "));
        assert!(!is_end_card(b"END"));
    }
}
