use futures::{StreamExt, TryStreamExt, stream};

use crate::{
    dao::{kv_store::KeyValueStore, models::cell_key, storage::StorageResult},
    state::canvas::Pixel,
};

/// Persist the color of an accepted pixel. Cells never expire.
pub async fn paint(store: &dyn KeyValueStore, pixel: &Pixel) -> StorageResult<()> {
    store
        .set(cell_key(pixel.x, pixel.y), pixel.color.clone(), None)
        .await
}

/// Current color at `(x, y)`, or `default_color` when the cell was never painted.
pub async fn color_at(
    store: &dyn KeyValueStore,
    x: u32,
    y: u32,
    default_color: &str,
) -> StorageResult<String> {
    Ok(store
        .get(cell_key(x, y))
        .await?
        .unwrap_or_else(|| default_color.to_owned()))
}

/// Read a `columns × rows` block starting at the origin, indexed as `grid[x][y]`.
///
/// Up to `concurrency` cell reads are in flight at once; results keep coordinate order.
pub async fn read_grid(
    store: &dyn KeyValueStore,
    columns: u32,
    rows: u32,
    default_color: &str,
    concurrency: usize,
) -> StorageResult<Vec<Vec<String>>> {
    let coordinates = (0..columns).flat_map(|x| (0..rows).map(move |y| (x, y)));
    let cells: Vec<String> = stream::iter(coordinates)
        .map(|(x, y)| color_at(store, x, y, default_color))
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    let mut grid = Vec::with_capacity(columns as usize);
    let mut cells = cells.into_iter();
    for _ in 0..columns {
        grid.push(cells.by_ref().take(rows as usize).collect());
    }
    Ok(grid)
}
