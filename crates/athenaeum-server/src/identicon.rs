//! Deterministic 5x5 identicon derived from the raw bytes of a URL path
//! segment (a file hash, typically). Left-right mirrored: only the 15 cells
//! in the left half plus centre column are independent.

use athenaeum_core::content_hash_hex;
use image::{ImageBuffer, Rgb, RgbImage};

const GRID: u32 = 5;
const CELL_PX: u32 = 4;
const BORDER_PX: u32 = 2;
const BACKGROUND: Rgb<u8> = Rgb([0xf8, 0xf8, 0xf8]);

const PALETTE: [Rgb<u8>; 8] = [
    Rgb([0xe6, 0x19, 0x4b]),
    Rgb([0x3c, 0xb4, 0x4b]),
    Rgb([0xff, 0xe1, 0x19]),
    Rgb([0x43, 0x63, 0xd8]),
    Rgb([0xf5, 0x82, 0x31]),
    Rgb([0x91, 0x1e, 0xb4]),
    Rgb([0x42, 0xd4, 0xf4]),
    Rgb([0xf0, 0x32, 0xe6]),
];

/// Renders the identicon PNG for `segment`'s raw bytes, encoded into `dest`.
pub fn render(segment: &[u8]) -> image::ImageResult<Vec<u8>> {
    let hash_hex = content_hash_hex(segment);
    let bits = u64::from_str_radix(&hash_hex, 16).unwrap_or(0);
    let color = PALETTE[(bits % 8) as usize];

    let dim = BORDER_PX * 2 + GRID * CELL_PX;
    let mut img: RgbImage = ImageBuffer::from_pixel(dim, dim, BACKGROUND);

    for row in 0..GRID {
        for col in 0..3 {
            let bit_index = row * 3 + col;
            let on = (bits >> bit_index) & 1 == 1;
            if !on {
                continue;
            }
            paint_cell(&mut img, row, col, color);
            paint_cell(&mut img, row, GRID - 1 - col, color);
        }
    }

    let mut buf = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buf);
    img.write_to(&mut cursor, image::ImageFormat::Png)?;
    Ok(buf)
}

fn paint_cell(img: &mut RgbImage, row: u32, col: u32, color: Rgb<u8>) {
    let x0 = BORDER_PX + col * CELL_PX;
    let y0 = BORDER_PX + row * CELL_PX;
    for dy in 0..CELL_PX {
        for dx in 0..CELL_PX {
            img.put_pixel(x0 + dx, y0 + dy, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_is_deterministic() {
        let a = render(b"0123456789abcdef").unwrap();
        let b = render(b"0123456789abcdef").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_segments_usually_differ() {
        let a = render(b"0123456789abcdef").unwrap();
        let b = render(b"fedcba9876543210").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn output_dimensions_match_grid_plus_border() {
        let png = render(b"abc").unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!(decoded.width(), BORDER_PX * 2 + GRID * CELL_PX);
        assert_eq!(decoded.height(), BORDER_PX * 2 + GRID * CELL_PX);
    }
}
