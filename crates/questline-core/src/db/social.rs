// ============================================================================
// Social Graph Operations - friendships and clans
// ============================================================================
// Friendships are stored once per unordered pair. Clan membership is keyed
// by user id, so a user can hold at most one membership; the clan's member
// count is written in the same transaction as every membership change.
// ============================================================================

use redb::{ReadableMultimapTable, ReadableTable, WriteTransaction};
use tracing::info;

use super::types::{Account, Clan, ClanMembership, ClanRole, FriendStatus, Friendship};
use super::{
    index_values, load, next_sequence, now, save, GameDb, ACCOUNTS, CLANS, CLAN_MEMBERS,
    CLAN_NAMES, FRIENDSHIPS, FRIENDSHIPS_BY_USER, MEMBERSHIPS,
};
use crate::types::{require_id, EngineError, Result};

/// Clan name length bounds, in characters, after trimming
pub const CLAN_NAME_MIN_LEN: usize = 3;
pub const CLAN_NAME_MAX_LEN: usize = 32;

const JOIN_SEQUENCE: &str = "clan_join_seq";

impl GameDb {
    // ========================================================================
    // Friendships
    // ========================================================================

    pub fn send_friend_request(&self, requester_id: &str, target_id: &str) -> Result<Friendship> {
        require_id("requester_id", requester_id)?;
        require_id("target_id", target_id)?;
        if requester_id == target_id {
            return Err(EngineError::SelfRequest);
        }

        let friendship = self.write(|txn| {
            require_accounts(txn, &[requester_id, target_id])?;

            let key = Friendship::pair_key(requester_id, target_id);
            let mut friendships = txn.open_table(FRIENDSHIPS)?;
            if let Some(existing) = load::<Friendship, _>(&friendships, &key)? {
                return Err(EngineError::AlreadyExists(format!(
                    "relationship between {} and {} ({})",
                    requester_id, target_id, existing.status
                )));
            }

            let friendship = Friendship::new(requester_id, target_id, FriendStatus::Pending, now());
            save(&mut friendships, &key, &friendship)?;

            let mut by_user = txn.open_multimap_table(FRIENDSHIPS_BY_USER)?;
            by_user.insert(requester_id, key.as_str())?;
            by_user.insert(target_id, key.as_str())?;
            Ok(friendship)
        })?;

        info!("Friend request {} -> {}", requester_id, target_id);
        Ok(friendship)
    }

    /// Accept or reject a pending request; only the non-requesting side may
    pub fn respond_friend_request(&self, user_id: &str, other_id: &str, accept: bool) -> Result<Friendship> {
        let friendship = self.write(|txn| {
            let key = Friendship::pair_key(user_id, other_id);
            let mut friendships = txn.open_table(FRIENDSHIPS)?;
            let mut friendship: Friendship = load(&friendships, &key)?.ok_or_else(|| {
                EngineError::RelationshipNotFound(user_id.to_string(), other_id.to_string())
            })?;

            if friendship.requester_id == user_id || !friendship.involves(user_id) {
                return Err(EngineError::Forbidden(
                    "only the recipient may respond to a friend request".into(),
                ));
            }
            if friendship.status != FriendStatus::Pending {
                return Err(EngineError::AlreadyResolved(format!(
                    "friend request is {}",
                    friendship.status
                )));
            }

            friendship.status = if accept {
                FriendStatus::Accepted
            } else {
                FriendStatus::Rejected
            };
            friendship.updated_at = now();
            save(&mut friendships, &key, &friendship)?;
            Ok(friendship)
        })?;

        info!(
            "{} {} friend request from {}",
            user_id,
            friendship.status,
            other_id
        );
        Ok(friendship)
    }

    /// Block `other_id`; creates the relationship if none exists yet
    pub fn block_user(&self, user_id: &str, other_id: &str) -> Result<Friendship> {
        require_id("user_id", user_id)?;
        require_id("other_id", other_id)?;
        if user_id == other_id {
            return Err(EngineError::SelfRequest);
        }

        let friendship = self.write(|txn| {
            let key = Friendship::pair_key(user_id, other_id);
            let mut friendships = txn.open_table(FRIENDSHIPS)?;
            let now = now();

            let friendship = match load::<Friendship, _>(&friendships, &key)? {
                Some(mut existing) => {
                    existing.status = FriendStatus::Blocked;
                    existing.blocked_by = Some(user_id.to_string());
                    existing.updated_at = now;
                    existing
                }
                None => {
                    require_accounts(txn, &[user_id, other_id])?;
                    let mut created = Friendship::new(user_id, other_id, FriendStatus::Blocked, now);
                    created.blocked_by = Some(user_id.to_string());
                    let mut by_user = txn.open_multimap_table(FRIENDSHIPS_BY_USER)?;
                    by_user.insert(user_id, key.as_str())?;
                    by_user.insert(other_id, key.as_str())?;
                    created
                }
            };
            save(&mut friendships, &key, &friendship)?;
            Ok(friendship)
        })?;

        info!("{} blocked {}", user_id, other_id);
        Ok(friendship)
    }

    /// Delete the relationship; either participant may
    pub fn remove_friendship(&self, user_id: &str, other_id: &str) -> Result<()> {
        self.write(|txn| {
            let key = Friendship::pair_key(user_id, other_id);
            let mut friendships = txn.open_table(FRIENDSHIPS)?;
            let removed = friendships.remove(key.as_str())?.is_some();
            if !removed {
                return Err(EngineError::RelationshipNotFound(
                    user_id.to_string(),
                    other_id.to_string(),
                ));
            }

            let mut by_user = txn.open_multimap_table(FRIENDSHIPS_BY_USER)?;
            by_user.remove(user_id, key.as_str())?;
            by_user.remove(other_id, key.as_str())?;
            Ok(())
        })?;

        info!("Removed relationship between {} and {}", user_id, other_id);
        Ok(())
    }

    /// Users with an accepted relationship to `user_id`
    pub fn friends_of(&self, user_id: &str) -> Result<Vec<String>> {
        let mut friends: Vec<String> = self
            .relationships_of(user_id)?
            .into_iter()
            .filter(|f| f.status == FriendStatus::Accepted)
            .map(|f| f.other(user_id).to_string())
            .collect();
        friends.sort();
        Ok(friends)
    }

    /// Pending requests awaiting a response from `user_id`
    pub fn incoming_requests(&self, user_id: &str) -> Result<Vec<Friendship>> {
        Ok(self
            .relationships_of(user_id)?
            .into_iter()
            .filter(|f| f.status == FriendStatus::Pending && f.requester_id != user_id)
            .collect())
    }

    pub fn friendship(&self, a: &str, b: &str) -> Result<Option<Friendship>> {
        let txn = self.read()?;
        let friendships = txn.open_table(FRIENDSHIPS)?;
        load(&friendships, &Friendship::pair_key(a, b))
    }

    /// Every relationship record involving `user_id`
    pub fn relationships_of(&self, user_id: &str) -> Result<Vec<Friendship>> {
        let txn = self.read()?;
        let by_user = txn.open_multimap_table(FRIENDSHIPS_BY_USER)?;
        let friendships = txn.open_table(FRIENDSHIPS)?;

        let mut results = Vec::new();
        for key in index_values(&by_user, user_id)? {
            if let Some(friendship) = load::<Friendship, _>(&friendships, &key)? {
                results.push(friendship);
            }
        }
        Ok(results)
    }

    // ========================================================================
    // Clans
    // ========================================================================

    pub fn create_clan(&self, name: &str, leader_id: &str) -> Result<Clan> {
        require_id("leader_id", leader_id)?;
        let name = validate_clan_name(name)?;
        let lookup = name.to_lowercase();

        let clan = self.write(|txn| {
            require_accounts(txn, &[leader_id])?;

            let mut names = txn.open_table(CLAN_NAMES)?;
            if names.get(lookup.as_str())?.is_some() {
                return Err(EngineError::DuplicateName(name.clone()));
            }

            let mut memberships = txn.open_table(MEMBERSHIPS)?;
            if load::<ClanMembership, _>(&memberships, leader_id)?.is_some() {
                return Err(EngineError::AlreadyMember(leader_id.to_string()));
            }

            let now = now();
            let clan = Clan {
                id: uuid::Uuid::new_v4().to_string(),
                name: name.clone(),
                leader_id: leader_id.to_string(),
                member_count: 1,
                total_experience: 0,
                created_at: now,
            };
            let membership = ClanMembership {
                clan_id: clan.id.clone(),
                user_id: leader_id.to_string(),
                role: ClanRole::Leader,
                contribution: 0,
                join_seq: next_sequence(txn, JOIN_SEQUENCE)?,
                joined_at: now,
            };

            names.insert(lookup.as_str(), clan.id.as_str())?;
            save(&mut memberships, leader_id, &membership)?;
            let mut clans = txn.open_table(CLANS)?;
            save(&mut clans, &clan.id, &clan)?;
            let mut members = txn.open_multimap_table(CLAN_MEMBERS)?;
            members.insert(clan.id.as_str(), leader_id)?;
            Ok(clan)
        })?;

        info!("Created clan '{}' ({}) led by {}", clan.name, clan.id, leader_id);
        Ok(clan)
    }

    pub fn join_clan(&self, user_id: &str, clan_id: &str) -> Result<ClanMembership> {
        require_id("user_id", user_id)?;

        let membership = self.write(|txn| {
            require_accounts(txn, &[user_id])?;

            let mut memberships = txn.open_table(MEMBERSHIPS)?;
            if load::<ClanMembership, _>(&memberships, user_id)?.is_some() {
                return Err(EngineError::AlreadyMember(user_id.to_string()));
            }

            let mut clans = txn.open_table(CLANS)?;
            let mut clan: Clan = load(&clans, clan_id)?
                .ok_or_else(|| EngineError::ClanNotFound(clan_id.to_string()))?;

            let membership = ClanMembership {
                clan_id: clan_id.to_string(),
                user_id: user_id.to_string(),
                role: ClanRole::Member,
                contribution: 0,
                join_seq: next_sequence(txn, JOIN_SEQUENCE)?,
                joined_at: now(),
            };
            clan.member_count += 1;

            save(&mut memberships, user_id, &membership)?;
            save(&mut clans, clan_id, &clan)?;
            let mut members = txn.open_multimap_table(CLAN_MEMBERS)?;
            members.insert(clan_id, user_id)?;
            Ok(membership)
        })?;

        info!("{} joined clan {}", user_id, clan_id);
        Ok(membership)
    }

    /// Leave the current clan. A leader with remaining members must transfer
    /// leadership first; a sole leader disbands the clan. Returns the clan as
    /// it stands afterwards, or `None` if it was disbanded.
    pub fn leave_clan(&self, user_id: &str) -> Result<Option<Clan>> {
        let result = self.write(|txn| {
            let mut memberships = txn.open_table(MEMBERSHIPS)?;
            let membership: ClanMembership = load(&memberships, user_id)?.ok_or_else(|| {
                EngineError::ClanNotFound(format!("no clan membership for {}", user_id))
            })?;

            let mut clans = txn.open_table(CLANS)?;
            let mut clan: Clan = load(&clans, &membership.clan_id)?
                .ok_or_else(|| EngineError::ClanNotFound(membership.clan_id.clone()))?;

            if membership.role == ClanRole::Leader && clan.member_count > 1 {
                return Err(EngineError::Forbidden(
                    "the leader must transfer leadership before leaving".into(),
                ));
            }

            memberships.remove(user_id)?;
            let mut members = txn.open_multimap_table(CLAN_MEMBERS)?;
            members.remove(clan.id.as_str(), user_id)?;

            if clan.member_count <= 1 {
                clans.remove(clan.id.as_str())?;
                let mut names = txn.open_table(CLAN_NAMES)?;
                names.remove(clan.name.to_lowercase().as_str())?;
                Ok((clan, true))
            } else {
                clan.member_count -= 1;
                save(&mut clans, &membership.clan_id, &clan)?;
                Ok((clan, false))
            }
        })?;

        match result {
            (clan, true) => {
                info!("{} left and disbanded clan '{}'", user_id, clan.name);
                Ok(None)
            }
            (clan, false) => {
                info!("{} left clan '{}'", user_id, clan.name);
                Ok(Some(clan))
            }
        }
    }

    pub fn transfer_leadership(&self, clan_id: &str, leader_id: &str, new_leader_id: &str) -> Result<Clan> {
        let clan = self.write(|txn| {
            let mut clans = txn.open_table(CLANS)?;
            let mut clan: Clan = load(&clans, clan_id)?
                .ok_or_else(|| EngineError::ClanNotFound(clan_id.to_string()))?;
            if clan.leader_id != leader_id {
                return Err(EngineError::Forbidden(
                    "only the clan leader may transfer leadership".into(),
                ));
            }
            if leader_id == new_leader_id {
                return Ok(clan);
            }

            let mut memberships = txn.open_table(MEMBERSHIPS)?;
            let mut successor: ClanMembership = match load::<ClanMembership, _>(&memberships, new_leader_id)? {
                Some(m) if m.clan_id == clan_id => m,
                _ => {
                    return Err(EngineError::InvalidInput(format!(
                        "{} is not a member of clan {}",
                        new_leader_id, clan_id
                    )))
                }
            };
            let mut outgoing: ClanMembership = load(&memberships, leader_id)?
                .ok_or_else(|| EngineError::ClanNotFound(format!("no clan membership for {}", leader_id)))?;

            outgoing.role = ClanRole::Member;
            successor.role = ClanRole::Leader;
            clan.leader_id = new_leader_id.to_string();

            save(&mut memberships, leader_id, &outgoing)?;
            save(&mut memberships, new_leader_id, &successor)?;
            save(&mut clans, clan_id, &clan)?;
            Ok(clan)
        })?;

        info!("Clan {} leadership: {} -> {}", clan_id, leader_id, new_leader_id);
        Ok(clan)
    }

    pub fn get_clan(&self, clan_id: &str) -> Result<Clan> {
        let txn = self.read()?;
        let clans = txn.open_table(CLANS)?;
        load(&clans, clan_id)?.ok_or_else(|| EngineError::ClanNotFound(clan_id.to_string()))
    }

    pub fn membership_of(&self, user_id: &str) -> Result<Option<ClanMembership>> {
        let txn = self.read()?;
        let memberships = txn.open_table(MEMBERSHIPS)?;
        load(&memberships, user_id)
    }

    /// Memberships of a clan in no particular order
    pub fn clan_memberships(&self, clan_id: &str) -> Result<Vec<ClanMembership>> {
        let txn = self.read()?;
        let clans = txn.open_table(CLANS)?;
        if load::<Clan, _>(&clans, clan_id)?.is_none() {
            return Err(EngineError::ClanNotFound(clan_id.to_string()));
        }

        let members = txn.open_multimap_table(CLAN_MEMBERS)?;
        let memberships = txn.open_table(MEMBERSHIPS)?;
        let mut results = Vec::new();
        for user_id in index_values(&members, clan_id)? {
            if let Some(m) = load::<ClanMembership, _>(&memberships, &user_id)? {
                results.push(m);
            }
        }
        Ok(results)
    }

    /// Members ordered by contribution, highest first; ties go to whoever
    /// joined earlier
    pub fn contribution_ranking(&self, clan_id: &str) -> Result<Vec<ClanMembership>> {
        let mut ranking = self.clan_memberships(clan_id)?;
        ranking.sort_by(|a, b| {
            b.contribution
                .cmp(&a.contribution)
                .then(a.join_seq.cmp(&b.join_seq))
        });
        Ok(ranking)
    }

    /// Number of membership rows indexed under a clan
    pub fn clan_membership_rows(&self, clan_id: &str) -> Result<usize> {
        let txn = self.read()?;
        let members = txn.open_multimap_table(CLAN_MEMBERS)?;
        let mut n = 0;
        for value in members.get(clan_id)? {
            value?;
            n += 1;
        }
        Ok(n)
    }
}

/// Add earned experience to the user's clan contribution and the clan total
pub(crate) fn credit_clan_contribution(txn: &WriteTransaction, user_id: &str, xp: u64) -> Result<()> {
    let mut memberships = txn.open_table(MEMBERSHIPS)?;
    let Some(mut membership) = load::<ClanMembership, _>(&memberships, user_id)? else {
        return Ok(());
    };

    let mut clans = txn.open_table(CLANS)?;
    let mut clan: Clan = load(&clans, &membership.clan_id)?
        .ok_or_else(|| EngineError::ClanNotFound(membership.clan_id.clone()))?;

    let overflow = || EngineError::InvalidInput(format!("clan {} experience would overflow", clan.id));
    let total_experience = clan.total_experience.checked_add(xp).ok_or_else(overflow)?;
    membership.contribution = membership.contribution.checked_add(xp).ok_or_else(overflow)?;
    clan.total_experience = total_experience;

    save(&mut memberships, user_id, &membership)?;
    save(&mut clans, &membership.clan_id, &clan)?;
    Ok(())
}

fn require_accounts(txn: &WriteTransaction, user_ids: &[&str]) -> Result<()> {
    let accounts = txn.open_table(ACCOUNTS)?;
    for user_id in user_ids {
        if load::<Account, _>(&accounts, user_id)?.is_none() {
            return Err(EngineError::AccountNotFound(user_id.to_string()));
        }
    }
    Ok(())
}

fn validate_clan_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    let len = trimmed.chars().count();
    if !(CLAN_NAME_MIN_LEN..=CLAN_NAME_MAX_LEN).contains(&len) {
        return Err(EngineError::InvalidInput(format!(
            "clan name must be {}-{} characters",
            CLAN_NAME_MIN_LEN, CLAN_NAME_MAX_LEN
        )));
    }
    Ok(trimmed.to_string())
}
