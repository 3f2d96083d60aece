//! J1939-81 address claim: emit PGN 60928, listen for competing claims,
//! defend when our NAME wins and move on (or give up) when it loses.
use super::name::J1939Name;
use super::{
    ADDRESS_CLAIM_WINDOW_MS, ARBITRARY_ADDRESS_FIRST, ARBITRARY_ADDRESS_LAST, GLOBAL_ADDRESS,
    NULL_ADDRESS, PGN_ADDRESS_CLAIM,
};
use crate::error::{CanIdBuildError, ClaimError, ExtractionError};
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::can_id::CanId;
use crate::protocol::transport::traits::{can_bus::CanBus, xnet_timer::XnetTimer};
use futures_util::future::{select, Either};
use futures_util::pin_mut;

/// Run a full claim cycle and return the acquired address.
///
/// The preferred address is tried first; arbitrary-address-capable NAMEs
/// then walk 128..=247. Each attempt listens for 250 ms. A node that loses
/// and cannot pick another address sends a "cannot claim" message and
/// returns [`NULL_ADDRESS`].
pub async fn claim_address<C: CanBus, T: XnetTimer>(
    can_bus: &mut C,
    timer: &T,
    my_name: J1939Name,
    preferred_address: u8,
) -> Result<u8, ClaimError<C::Error>>
where
    C::Error: core::fmt::Debug,
{
    let arbitrary_capable = my_name.is_arbitrary_address_capable();

    for address in AddressCandidates::new(preferred_address, arbitrary_capable) {
        #[cfg(feature = "defmt")]
        defmt::info!("Claiming address {}", address);

        let claim = build_address_claim_frame(my_name, address)?;
        can_bus.send(&claim).await.map_err(ClaimError::SendError)?;

        let window = timer.delay_ms(ADDRESS_CLAIM_WINDOW_MS);
        pin_mut!(window);

        'listen: loop {
            let contest = {
                let recv = can_bus.recv();
                pin_mut!(recv);

                match select(window.as_mut(), recv).await {
                    Either::Left(_) => {
                        #[cfg(feature = "defmt")]
                        defmt::info!("Address {} claimed", address);
                        return Ok(address);
                    }
                    Either::Right((Err(err), _)) => return Err(ClaimError::ReceiveError(err)),
                    Either::Right((Ok(frame), _)) => {
                        if !is_competing_claim(&frame, address, my_name) {
                            Contest::None
                        } else if my_name.wins_against(extract_name_from_claim(&frame)?) {
                            Contest::Won
                        } else {
                            Contest::Lost
                        }
                    }
                }
            };

            match contest {
                Contest::None => {}
                Contest::Won => {
                    #[cfg(feature = "defmt")]
                    defmt::debug!("Claim contest on {} won, defending", address);
                    let claim = build_address_claim_frame(my_name, address)?;
                    can_bus.send(&claim).await.map_err(ClaimError::SendError)?;
                }
                Contest::Lost if arbitrary_capable => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("Claim contest on {} lost, trying next", address);
                    break 'listen;
                }
                Contest::Lost => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("Claim contest on {} lost, cannot claim", address);
                    send_cannot_claim(can_bus, my_name).await?;
                    return Ok(NULL_ADDRESS);
                }
            }
        }
    }

    #[cfg(feature = "defmt")]
    defmt::error!("No address left to claim");
    send_cannot_claim(can_bus, my_name).await?;
    Err(ClaimError::NoAddressAvailable)
}

/// Outcome of one frame heard during the claim window.
enum Contest {
    None,
    Won,
    Lost,
}

async fn send_cannot_claim<C: CanBus>(
    can_bus: &mut C,
    my_name: J1939Name,
) -> Result<(), ClaimError<C::Error>>
where
    C::Error: core::fmt::Debug,
{
    let frame = build_address_claim_frame(my_name, NULL_ADDRESS)?;
    can_bus.send(&frame).await.map_err(ClaimError::SendError)
}

//==================================================================================ADDRESS_CANDIDATES
/// Candidate addresses in claim order.
struct AddressCandidates {
    preferred: Option<u8>,
    skip: Option<u8>,
    next_arbitrary: u16,
    arbitrary_capable: bool,
}

impl AddressCandidates {
    fn new(preferred: u8, arbitrary_capable: bool) -> Self {
        let preferred = (preferred <= ARBITRARY_ADDRESS_LAST).then_some(preferred);
        Self {
            preferred,
            skip: preferred,
            next_arbitrary: ARBITRARY_ADDRESS_FIRST as u16,
            arbitrary_capable,
        }
    }
}

impl Iterator for AddressCandidates {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        if let Some(preferred) = self.preferred.take() {
            return Some(preferred);
        }
        if !self.arbitrary_capable {
            return None;
        }
        while self.next_arbitrary <= ARBITRARY_ADDRESS_LAST as u16 {
            let candidate = self.next_arbitrary as u8;
            self.next_arbitrary += 1;
            if Some(candidate) != self.skip {
                return Some(candidate);
            }
        }
        None
    }
}

//==================================================================================ADDRESS_CLAIM_FRAME
/// Address claim frame (PGN 60928, global destination) for `address`.
pub fn build_address_claim_frame(
    my_name: J1939Name,
    address: u8,
) -> Result<CanFrame, CanIdBuildError> {
    let id = CanId::builder(PGN_ADDRESS_CLAIM, address)
        .to_destination(GLOBAL_ADDRESS)
        .with_priority(6)
        .build()?;
    Ok(CanFrame::new(id, &my_name.raw().to_le_bytes()))
}

/// Claim for `address` sent by another NAME.
pub fn is_competing_claim(frame: &CanFrame, address: u8, my_name: J1939Name) -> bool {
    frame.id.pgn() == PGN_ADDRESS_CLAIM
        && frame.id.source_address() == address
        && extract_name_from_claim(frame).is_ok_and(|their_name| their_name != my_name)
}

/// NAME carried by an address claim frame.
pub fn extract_name_from_claim(frame: &CanFrame) -> Result<J1939Name, ExtractionError> {
    if frame.id.pgn() != PGN_ADDRESS_CLAIM {
        return Err(ExtractionError::InvalidIncomingFrame);
    }
    if frame.len != 8 {
        return Err(ExtractionError::InvalidDataLen);
    }
    Ok(J1939Name::from_raw(u64::from_le_bytes(frame.data)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[test]
    fn test_candidates_non_arbitrary() {
        let all: Vec<u8> = AddressCandidates::new(42, false).collect();
        assert_eq!(all, [42]);
        assert_eq!(AddressCandidates::new(NULL_ADDRESS, false).count(), 0);
    }

    #[test]
    fn test_candidates_arbitrary_skip_preferred() {
        let all: Vec<u8> = AddressCandidates::new(130, true).collect();
        assert_eq!(all[0], 130);
        assert_eq!(&all[1..4], &[128, 129, 131]);
        assert_eq!(all.len(), 120);
        assert_eq!(*all.last().unwrap(), 247);
    }

    #[test]
    fn test_claim_frame_layout() {
        let name = J1939Name::from_raw(0x0102_0304_0506_0708);
        let frame = build_address_claim_frame(name, 0x80).unwrap();
        assert_eq!(frame.id.pgn(), PGN_ADDRESS_CLAIM);
        assert_eq!(frame.id.destination(), Some(GLOBAL_ADDRESS));
        assert_eq!(frame.id.source_address(), 0x80);
        assert_eq!(extract_name_from_claim(&frame).unwrap(), name);
        assert!(is_competing_claim(&frame, 0x80, J1939Name::from_raw(1)));
        assert!(!is_competing_claim(&frame, 0x80, name));
    }
}
