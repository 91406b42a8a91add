//! Chunk sizing and the descriptor schedule.

use bytes::Bytes;

const MIB: u64 = 1024 * 1024;
const SMALL_FILE_THRESHOLD: u64 = 10 * MIB;
const LARGE_FILE_THRESHOLD: u64 = 500 * MIB;

/// `file_size <= 10 MiB` divides evenly across the worker pool;
/// `<= 500 MiB` divides across three pool-widths' worth of chunks
/// (smaller chunks, more parallelism headroom); above that, every chunk
/// is `max_chunk_size`. Always capped at `max_chunk_size` and floored at 1.
pub fn chunk_size_for(file_size: u64, max_threads: usize, max_chunk_size: u64) -> u64 {
    let threads = (max_threads as u64).max(1);
    let raw = if file_size <= SMALL_FILE_THRESHOLD {
        file_size / threads
    } else if file_size <= LARGE_FILE_THRESHOLD {
        file_size / (3 * threads)
    } else {
        max_chunk_size
    };
    raw.clamp(1, max_chunk_size)
}

#[derive(Debug, Clone)]
pub struct ChunkDescriptor {
    pub id: u32,
    pub start: u64,
    pub end: u64,
    pub data: Option<Bytes>,
    pub downloaded: bool,
    pub consumed: bool,
}

impl ChunkDescriptor {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Builds the ordered chunk schedule covering `[l, r]` inclusive. Chunk `k`
/// covers `[l + k*chunk_size, min(l + (k+1)*chunk_size - 1, r)]`.
pub fn build_schedule(l: u64, r: u64, chunk_size: u64) -> Vec<ChunkDescriptor> {
    let file_size = r - l + 1;
    let total_chunks = file_size.div_ceil(chunk_size);

    (0..total_chunks)
        .map(|k| {
            let start = l + k * chunk_size;
            let end = std::cmp::min(l + (k + 1) * chunk_size - 1, r);
            ChunkDescriptor {
                id: k as u32,
                start,
                end,
                data: None,
                downloaded: false,
                consumed: false,
            }
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn small_file_divides_across_pool() {
        let size = chunk_size_for(8 * MIB, 32, 8 * MIB);
        assert_eq!(size, 8 * MIB / 32);
    }

    #[test]
    fn mid_file_divides_across_triple_pool() {
        let size = chunk_size_for(100 * MIB, 32, 8 * MIB);
        assert_eq!(size, 100 * MIB / (3 * 32));
    }

    #[test]
    fn huge_file_uses_max_chunk_size() {
        let size = chunk_size_for(2_000 * MIB, 32, 8 * MIB);
        assert_eq!(size, 8 * MIB);
    }

    #[test]
    fn schedule_covers_the_whole_range_in_order_with_no_gaps() {
        let schedule = build_schedule(100, 999, 200);
        assert_eq!(schedule.first().unwrap().start, 100);
        assert_eq!(schedule.last().unwrap().end, 999);
        for pair in schedule.windows(2) {
            assert_eq!(pair[0].end + 1, pair[1].start);
        }
    }

    #[test]
    fn last_chunk_is_clipped_to_r() {
        let schedule = build_schedule(0, 10, 4);
        assert_eq!(schedule.len(), 3);
        assert_eq!(schedule[2].start, 8);
        assert_eq!(schedule[2].end, 10);
    }
}
