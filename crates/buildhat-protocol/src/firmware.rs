//! 固件传输编码
//!
//! bootloader 先接收 `load LEN CHECKSUM`（或 `signature LEN`）命令，
//! 然后接收 STX/ETX 包裹的二进制载荷。

/// 帧起始字节
pub const STX: u8 = 0x02;
/// 帧结束字节
pub const ETX: u8 = 0x03;
/// 行结束符
pub const CR: u8 = b'\r';

/// bootloader 对 `version` 的应答中包含的横幅
pub const BOOTLOADER_BANNER: &str = "BuildHAT bootloader version";
/// 正常固件对 `version` 的应答前缀
pub const FIRMWARE_PREFIX: &str = "Firmware version: ";

const CHECKSUM_SEED: u32 = 1;
const CHECKSUM_POLY: u32 = 0x1D87_2B41;

/// 计算 bootloader 使用的 32 位校验和
///
/// 种子为 1；每个字节：累加器最高位为 1 时左移后异或多项式，否则仅左移；
/// 然后异或该字节。
pub fn checksum(data: &[u8]) -> u32 {
    data.iter().fold(CHECKSUM_SEED, |acc, &byte| {
        let shifted = if acc & 0x8000_0000 != 0 {
            (acc << 1) ^ CHECKSUM_POLY
        } else {
            acc << 1
        };
        shifted ^ u32::from(byte)
    })
}

/// 将载荷包装为 `STX + data + ETX + CR`
pub fn frame_payload(data: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(data.len() + 3);
    frame.push(STX);
    frame.extend_from_slice(data);
    frame.push(ETX);
    frame.push(CR);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_checksum_empty_is_seed() {
        assert_eq!(checksum(&[]), 1);
    }

    #[test]
    fn test_checksum_known_values() {
        // 1 << 1 = 2, 2 ^ 0x01 = 3
        assert_eq!(checksum(&[0x01]), 3);
        // 3 << 1 = 6, 6 ^ 0xff = 0xf9
        assert_eq!(checksum(&[0x01, 0xff]), 0xf9);
    }

    #[test]
    fn test_checksum_high_bit_applies_polynomial() {
        // 32 个零字节后种子的 1 移到最高位，下一次移位触发多项式
        let mut data = vec![0u8; 31];
        assert_eq!(checksum(&data), 0x8000_0000);
        data.push(0);
        assert_eq!(checksum(&data), CHECKSUM_POLY);
    }

    #[test]
    fn test_frame_payload_layout() {
        assert_eq!(frame_payload(&[0xaa, 0xbb]), vec![0x02, 0xaa, 0xbb, 0x03, b'\r']);
        assert_eq!(frame_payload(&[]), vec![0x02, 0x03, b'\r']);
    }

    proptest! {
        #[test]
        fn prop_checksum_deterministic(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            prop_assert_eq!(checksum(&data), checksum(&data));
        }

        #[test]
        fn prop_checksum_sensitive_to_last_byte(
            mut data in proptest::collection::vec(any::<u8>(), 1..256),
            flip in 1u8..=255,
        ) {
            // 最后一个字节只经过一次异或，任何改动都会反映在结果中
            let before = checksum(&data);
            let last = data.len() - 1;
            data[last] ^= flip;
            prop_assert_ne!(before, checksum(&data));
        }
    }
}
