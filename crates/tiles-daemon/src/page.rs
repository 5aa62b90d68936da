use crate::icons::has_scheme;
use tiles_proto::platform::DEFAULT_ICON;
use tiles_proto::protocol::Tile;

const INDEX_TEMPLATE: &str = include_str!("../assets/index.html");
const TILES_SLOT: &str = "{{tiles}}";

/// Full dashboard page for `tiles`, in stored order.
pub fn render_index(tiles: &[Tile]) -> String {
    let markup: String = tiles.iter().map(render_tile).collect();
    INDEX_TEMPLATE.replace(TILES_SLOT, &markup)
}

fn render_tile(tile: &Tile) -> String {
    let icon = if tile.icon.is_empty() {
        DEFAULT_ICON
    } else {
        tile.icon.as_str()
    };
    format!(
        r#"      <div class="tile" data-label="{label}" data-url="{url}" data-icon="{icon}">
        <a href="{href}" target="_blank" rel="noopener"><img src="{icon}" alt=""><span>{label}</span></a>
        <button class="edit" title="Edit">&#9998;</button>
        <button class="remove" title="Remove">&times;</button>
      </div>
"#,
        label = escape_html(&tile.label),
        url = escape_html(&tile.url),
        href = escape_html(&link_href(&tile.url)),
        icon = escape_html(icon),
    )
}

/// Tiles may store a bare host; browsers need a scheme to leave the page.
fn link_href(url: &str) -> String {
    if has_scheme(url) {
        url.to_string()
    } else {
        format!("http://{}", url)
    }
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
