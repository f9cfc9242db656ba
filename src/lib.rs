mod algorithm;
mod error;
mod handlers;
mod inverse;
mod packed;
mod params;
mod primitives;
mod rank_dictionary;
mod string_set;
mod sum_tree;

pub use algorithm::radices::DOLLAR_SYMBOL;
pub use algorithm::{LargeBwtStats, large_bwt};
pub use error::{LargeBwtError, LargeBwtResult};
pub use handlers::{
    BwtBatch, BwtHandler, BwtOutput, BwtSsaHandler, DiscardBwtHandler, HostBwtHandler,
    PackedBwtHandler, SampledSuffixArray, SsaHandler, StringBwtHandler,
};
pub use inverse::{invert_string_bwt, invert_string_set_bwt};
pub use packed::{MAX_SYMBOL_BITS, MIN_SYMBOL_BITS, PackedLayout, PackedString, PackedWord};
pub use params::{BackendKind, BwtParams};
pub use primitives::{Backend, ExecutionContext, Parallel, Sequential};
pub use rank_dictionary::RankDictionary;
pub use string_set::{PackedStringSet, SingleString, StringSet, SuffixCoord};
pub use sum_tree::SumTree;

/// Entry point for BWT construction, holding the parameters of the runs
#[derive(Debug, Clone, Default)]
pub struct LargeBwtBuilder {
    params: BwtParams,
}

impl LargeBwtBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(&mut self, params: BwtParams) -> &mut Self {
        self.params = params;
        self
    }

    pub fn with_host_memory(&mut self, bytes: u64) -> &mut Self {
        self.params.host_memory = bytes;
        self
    }

    pub fn with_device_memory(&mut self, bytes: u64) -> &mut Self {
        self.params.device_memory = bytes;
        self
    }

    pub fn with_bucketing_bits(&mut self, bucketing_bits: &[u32]) -> &mut Self {
        self.params.bucketing_bits = bucketing_bits.to_vec();
        self
    }

    pub fn with_dcs_period(&mut self, period: u32) -> &mut Self {
        self.params.dcs_period = period;
        self
    }

    pub fn with_chunk_strings(&mut self, chunk_strings: u32) -> &mut Self {
        self.params.chunk_strings = chunk_strings;
        self
    }

    pub fn with_slice_suffixes(&mut self, slice_suffixes: u32) -> &mut Self {
        self.params.slice_suffixes = slice_suffixes;
        self
    }

    pub fn with_backend(&mut self, backend: BackendKind) -> &mut Self {
        self.params.backend = backend;
        self
    }

    pub fn with_num_threads(&mut self, num_threads: usize) -> &mut Self {
        self.params.num_threads = Some(num_threads);
        self
    }

    pub fn params(&self) -> &BwtParams {
        &self.params
    }

    /// Streams the BWT of a string set into `handler`: one terminator row per
    /// string first, then the rows of all non-empty suffixes in sorted order
    pub fn large_bwt<S: StringSet, H: BwtHandler>(
        &self,
        string_set: &S,
        handler: &mut H,
    ) -> LargeBwtResult<LargeBwtStats> {
        self.params.validate(string_set.symbol_bits())?;

        match self.params.backend {
            BackendKind::Sequential => {
                let ctx = ExecutionContext::new(Sequential);
                algorithm::large_bwt(&ctx, string_set, handler, &self.params)
            }
            BackendKind::Parallel => {
                let ctx = ExecutionContext::new(Parallel::new(self.params.num_threads)?);
                algorithm::large_bwt(&ctx, string_set, handler, &self.params)
            }
        }
    }

    /// The BWT of a single string without its terminator, and the primary
    /// index the terminator was removed from
    pub fn bwt<W: PackedWord>(&self, text: &PackedString<W>) -> LargeBwtResult<(Vec<u8>, u64)> {
        let (output, primary) = self.string_bwt(text, HostBwtHandler::new())?;
        Ok((output.into_bwt(), primary))
    }

    pub fn packed_bwt<W: PackedWord>(
        &self,
        text: &PackedString<W>,
    ) -> LargeBwtResult<(PackedString<W>, u64)> {
        let (output, primary) = self.string_bwt(text, PackedBwtHandler::new(text.layout()))?;
        Ok((output.into_parts().0, primary))
    }

    /// Like [`bwt`](Self::bwt), plus every `modulus`-th suffix array entry.
    /// The suffix array includes the terminator row at the primary index.
    pub fn bwt_with_ssa<W: PackedWord>(
        &self,
        text: &PackedString<W>,
        modulus: u64,
    ) -> LargeBwtResult<(Vec<u8>, u64, SampledSuffixArray)> {
        if modulus == 0 {
            return Err(LargeBwtError::InvalidParams(
                "sampling modulus must be positive".into(),
            ));
        }

        let handler = BwtSsaHandler::new(HostBwtHandler::new(), modulus);
        let (output, primary) = self.string_bwt(text, handler)?;
        let (bwt, ssa) = output.into_parts();

        Ok((bwt.into_bwt(), primary, ssa))
    }

    /// All suffixes of the string set in sorted order, terminators included
    pub fn suffix_sort<S: StringSet>(&self, string_set: &S) -> LargeBwtResult<Vec<SuffixCoord>> {
        let mut handler = SsaHandler::new(1);
        self.large_bwt(string_set, &mut handler)?;
        Ok(handler.into_ssa().into_samples())
    }

    fn string_bwt<W: PackedWord, O: BwtOutput>(
        &self,
        text: &PackedString<W>,
        output: O,
    ) -> LargeBwtResult<(O, u64)> {
        let string = SingleString::new(text)?;
        let mut handler = StringBwtHandler::new(output);

        self.large_bwt(&string, &mut handler)?;
        handler.finish()
    }
}

/// The primary index of the BWT of `text` found by direct suffix comparison:
/// one past the number of proper suffixes smaller than the whole string
pub fn find_primary<W: PackedWord>(text: &PackedString<W>) -> LargeBwtResult<u64> {
    let string = SingleString::new(text)?;
    let whole = SuffixCoord::new(0, 0);

    // the empty string only has its terminator row
    if text.is_empty() {
        return Ok(0);
    }

    let num_smaller = (1..text.len() as u32)
        .filter(|&offset| {
            algorithm::radices::compare_suffixes(&string, SuffixCoord::new(0, offset), whole)
                .is_lt()
        })
        .count();

    Ok(1 + num_smaller as u64)
}
