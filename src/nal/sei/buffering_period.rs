use crate::nal::sps::{self, SeqParamSetId, SeqParamSetIdError};
use crate::nal::ParamSets;
use crate::rbsp::{BitRead, BitReaderError};

#[derive(Debug)]
pub enum BufferingPeriodError {
    ReaderError(BitReaderError),
    UndefinedSeqParamSetId(SeqParamSetId),
    InvalidSeqParamSetId(SeqParamSetIdError),
}
impl From<BitReaderError> for BufferingPeriodError {
    fn from(e: BitReaderError) -> Self {
        BufferingPeriodError::ReaderError(e)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct InitialCpbRemoval {
    pub initial_cpb_removal_delay: u32,
    pub initial_cpb_removal_delay_offset: u32,
}

fn read_cpb_removal_delay_list<R: BitRead>(
    r: &mut R,
    hrd: &sps::HrdParameters,
) -> Result<Vec<InitialCpbRemoval>, BitReaderError> {
    let length = u32::from(hrd.initial_cpb_removal_delay_length_minus1) + 1;
    let mut res = Vec::with_capacity(hrd.cpb_specs.len());
    for _ in 0..hrd.cpb_specs.len() {
        res.push(InitialCpbRemoval {
            initial_cpb_removal_delay: r.read_u32(length, "initial_cpb_removal_delay")?,
            initial_cpb_removal_delay_offset: r
                .read_u32(length, "initial_cpb_removal_delay_offset")?,
        });
    }
    Ok(res)
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BufferingPeriod {
    pub seq_parameter_set_id: SeqParamSetId,
    pub nal_hrd_bp: Option<Vec<InitialCpbRemoval>>,
    pub vcl_hrd_bp: Option<Vec<InitialCpbRemoval>>,
}
impl BufferingPeriod {
    /// Reads the `seq_parameter_set_id` that opens a buffering period payload.
    pub fn read_sps_id<R: BitRead>(r: &mut R) -> Result<SeqParamSetId, BufferingPeriodError> {
        SeqParamSetId::from_u32(r.read_ue("seq_parameter_set_id")?)
            .map_err(BufferingPeriodError::InvalidSeqParamSetId)
    }

    /// Reads the rest of the payload, whose layout is given by the HRD parameters of the SPS
    /// identified by `seq_parameter_set_id`.
    pub fn read_rest<C: ParamSets + ?Sized, R: BitRead>(
        ctx: &C,
        r: &mut R,
        seq_parameter_set_id: SeqParamSetId,
    ) -> Result<BufferingPeriod, BufferingPeriodError> {
        let sps = ctx
            .any_sps_by_id(seq_parameter_set_id)
            .ok_or(BufferingPeriodError::UndefinedSeqParamSetId(
                seq_parameter_set_id,
            ))?;
        let vui = sps.vui_parameters.as_ref();
        let nal_hrd_bp = vui
            .and_then(|v| v.nal_hrd_parameters.as_ref())
            .map(|hrd| read_cpb_removal_delay_list(r, hrd))
            .transpose()?;
        let vcl_hrd_bp = vui
            .and_then(|v| v.vcl_hrd_parameters.as_ref())
            .map(|hrd| read_cpb_removal_delay_list(r, hrd))
            .transpose()?;
        Ok(BufferingPeriod {
            seq_parameter_set_id,
            nal_hrd_bp,
            vcl_hrd_bp,
        })
    }

    pub fn read<C: ParamSets + ?Sized, R: BitRead>(
        ctx: &C,
        r: &mut R,
    ) -> Result<BufferingPeriod, BufferingPeriodError> {
        let id = Self::read_sps_id(r)?;
        Self::read_rest(ctx, r, id)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::rbsp::BitReader;
    use crate::Context;
    use hex_literal::hex;

    #[test]
    fn parse() {
        // https://standards.iso.org/ittf/PubliclyAvailableStandards/ISO_IEC_14496-4_2004_Amd_6_2005_Bitstreams/
        // This example taken from CVSEFDFT3_Sony_E.zip.
        let mut ctx = Context::default();
        let sps_rbsp = hex!(
            "
            4d 60 15 8d 8d 28 58 9d 08 00 00 0f a0 00 07 53
            07 00 00 00 92 7c 00 00 12 4f 80 fb dc 18 00 00
            0f 42 40 00 07 a1 20 7d ee 07 c6 0c 62 60
        "
        );
        ctx.put_seq_param_set(
            sps::SeqParameterSet::from_bits(BitReader::new(&sps_rbsp[..])).unwrap(),
        );

        let payload = &hex!("d7 e4 00 00 57 e4 00 00 40")[..];
        assert_eq!(
            BufferingPeriod::read(&ctx, &mut BitReader::new(payload)).unwrap(),
            BufferingPeriod {
                seq_parameter_set_id: SeqParamSetId::from_u32(0).unwrap(),
                nal_hrd_bp: Some(vec![InitialCpbRemoval {
                    initial_cpb_removal_delay: 45_000,
                    initial_cpb_removal_delay_offset: 0,
                }]),
                vcl_hrd_bp: Some(vec![InitialCpbRemoval {
                    initial_cpb_removal_delay: 45_000,
                    initial_cpb_removal_delay_offset: 0,
                }]),
            }
        );
    }

    #[test]
    fn undefined_sps() {
        let ctx = Context::default();
        // seq_parameter_set_id = 2
        let payload = [0b0110_0000];
        assert!(matches!(
            BufferingPeriod::read(&ctx, &mut BitReader::new(&payload[..])),
            Err(BufferingPeriodError::UndefinedSeqParamSetId(id)) if id.id() == 2
        ));
    }
}
