//! Renderings of the keyboard matrix: a plain-text table and an SVG drawing
//! with one rectangle per matrix position.

use amiga_keymap::{KeyCode, KeyMap, COLS, ROWS};

/// Placed key for SVG rendering.
struct Key {
    x: f64,
    y: f64,
    w: f64,
    row: usize,
    col: usize,
}

/// Key unit size in SVG pixels.
const U: f64 = 54.0;
const GAP: f64 = 4.0;
/// Step: key + gap.
const S: f64 = U + GAP;
/// Corner radius.
const R: f64 = 4.0;
const MARGIN: f64 = 20.0;
/// Space above the grid for the title.
const TITLE_H: f64 = 30.0;

/// Row indent in key units, so the grid reads like a staggered keyboard.
const ROW_INDENT: [f64; ROWS] = [0.0, 0.25, 0.5, 0.75, 1.0, 0.0];

/// Width of a key in units.
fn key_units(key: KeyCode) -> f64 {
    match key {
        KeyCode::Space => 2.0,
        KeyCode::Tab | KeyCode::Enter | KeyCode::LShift | KeyCode::RShift => 1.5,
        _ => 1.0,
    }
}

/// Lay out every mapped position left to right, row by row.
fn build_keys(keymap: &KeyMap) -> Vec<Key> {
    let mut keys = Vec::with_capacity(ROWS * COLS);

    for (row, indent) in ROW_INDENT.iter().enumerate() {
        let mut x = indent * S;
        for col in 0..COLS {
            let Some(code) = keymap.get(row, col) else {
                continue;
            };
            let w = key_units(code) * U + (key_units(code) - 1.0) * GAP;
            keys.push(Key {
                x,
                y: row as f64 * S,
                w,
                row,
                col,
            });
            x += w + GAP;
        }
    }

    keys
}

/// Right and bottom edge of the laid-out keys.
fn bbox(keys: &[Key]) -> (f64, f64) {
    keys.iter().fold((0.0_f64, 0.0_f64), |(max_x, max_y), k| {
        (max_x.max(k.x + k.w), max_y.max(k.y + U))
    })
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Standalone SVG document of the keymap.
pub fn render_svg(keymap: &KeyMap) -> String {
    let keys = build_keys(keymap);
    let (content_w, content_h) = bbox(&keys);
    let width = content_w + 2.0 * MARGIN;
    let height = content_h + 2.0 * MARGIN + TITLE_H;

    let mut svg = format!(
        r#"<svg width="{width}" height="{height}" xmlns="http://www.w3.org/2000/svg">
<style>
  .bg {{ fill: #1a1a2e; }}
  .key {{ fill: #16213e; stroke: #0f3460; stroke-width: 1.5; }}
  .key.modifier {{ fill: #1b2e4e; stroke: #53a8b6; }}
  .label {{
    fill: #eee;
    font-family: "JetBrains Mono", "Fira Code", monospace;
    font-size: 13px;
    text-anchor: middle;
    dominant-baseline: middle;
  }}
  .label.small {{ font-size: 10px; }}
  .pos {{ fill: #667; font-family: monospace; font-size: 8px; }}
  .title {{ fill: #e94560; font-family: system-ui, sans-serif; font-size: 16px; font-weight: bold; }}
</style>
<rect width="100%" height="100%" class="bg"/>
<text x="{MARGIN}" y="{title_y}" class="title">Amiga keyboard matrix ({ROWS} x {COLS})</text>
<g transform="translate({MARGIN}, {grid_y})">
"#,
        title_y = MARGIN + 10.0,
        grid_y = MARGIN + TITLE_H,
    );

    for key in &keys {
        let Some(code) = keymap.get(key.row, key.col) else {
            continue;
        };
        let class = if code.is_modifier() { "key modifier" } else { "key" };
        let label = code.display_name();
        let font_class = if label.len() > 3 { " small" } else { "" };

        svg.push_str(&format!(
            r#"<rect x="{}" y="{}" width="{}" height="{U}" rx="{R}" class="{class}"/>"#,
            key.x, key.y, key.w,
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" class="label{font_class}">{}</text>"#,
            key.x + key.w / 2.0,
            key.y + U / 2.0 + 1.0,
            xml_escape(label),
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" class="pos">{},{}</text>"#,
            key.x + 4.0,
            key.y + 10.0,
            key.row,
            key.col,
        ));
        svg.push('\n');
    }

    svg.push_str("</g>\n</svg>\n");
    svg
}

/// Text table with one line per matrix row.
pub fn render_table(keymap: &KeyMap) -> String {
    let mut table = String::from("     ");
    for col in 0..COLS {
        table.push_str(&format!("{:>6}", format!("c{col}")));
    }
    table.push('\n');

    for row in 0..ROWS {
        table.push_str(&format!("r{row}:  "));
        for col in 0..COLS {
            let label = keymap.get(row, col).map_or("-", KeyCode::display_name);
            table.push_str(&format!("{label:>6}"));
        }
        table.push('\n');
    }

    table
}
