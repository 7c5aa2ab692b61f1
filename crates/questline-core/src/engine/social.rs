// ============================================================================
// Engine: friendships and clans
// ============================================================================

use super::Engine;
use crate::db::{Clan, ClanMembership, Friendship};
use crate::types::Result;

impl Engine {
    pub async fn send_friend_request(&self, requester_id: &str, target_id: &str) -> Result<Friendship> {
        let _guard = self
            .lock("send_friend_request", &[requester_id, target_id])
            .await?;
        self.db.send_friend_request(requester_id, target_id)
    }

    pub async fn respond_friend_request(&self, user_id: &str, other_id: &str, accept: bool) -> Result<Friendship> {
        let _guard = self
            .lock("respond_friend_request", &[user_id, other_id])
            .await?;
        self.db.respond_friend_request(user_id, other_id, accept)
    }

    pub async fn block_user(&self, user_id: &str, other_id: &str) -> Result<Friendship> {
        let _guard = self.lock("block_user", &[user_id, other_id]).await?;
        self.db.block_user(user_id, other_id)
    }

    pub async fn remove_friendship(&self, user_id: &str, other_id: &str) -> Result<()> {
        let _guard = self.lock("remove_friendship", &[user_id, other_id]).await?;
        self.db.remove_friendship(user_id, other_id)
    }

    pub async fn friendship(&self, a: &str, b: &str) -> Result<Option<Friendship>> {
        self.db.friendship(a, b)
    }

    pub async fn friends_of(&self, user_id: &str) -> Result<Vec<String>> {
        self.db.friends_of(user_id)
    }

    pub async fn incoming_requests(&self, user_id: &str) -> Result<Vec<Friendship>> {
        self.db.incoming_requests(user_id)
    }

    pub async fn create_clan(&self, name: &str, leader_id: &str) -> Result<Clan> {
        let _guard = self.lock("create_clan", &[leader_id]).await?;
        self.db.create_clan(name, leader_id)
    }

    pub async fn join_clan(&self, user_id: &str, clan_id: &str) -> Result<ClanMembership> {
        let _guard = self.lock("join_clan", &[user_id]).await?;
        self.db.join_clan(user_id, clan_id)
    }

    /// `None` when leaving disbanded the clan
    pub async fn leave_clan(&self, user_id: &str) -> Result<Option<Clan>> {
        let _guard = self.lock("leave_clan", &[user_id]).await?;
        self.db.leave_clan(user_id)
    }

    pub async fn transfer_leadership(&self, clan_id: &str, leader_id: &str, new_leader_id: &str) -> Result<Clan> {
        let _guard = self
            .lock("transfer_leadership", &[leader_id, new_leader_id])
            .await?;
        self.db.transfer_leadership(clan_id, leader_id, new_leader_id)
    }

    pub async fn get_clan(&self, clan_id: &str) -> Result<Clan> {
        self.db.get_clan(clan_id)
    }

    /// The clan `user_id` belongs to, if any
    pub async fn clan_of(&self, user_id: &str) -> Result<Option<Clan>> {
        match self.db.membership_of(user_id)? {
            Some(membership) => Ok(Some(self.db.get_clan(&membership.clan_id)?)),
            None => Ok(None),
        }
    }

    pub async fn contribution_ranking(&self, clan_id: &str) -> Result<Vec<ClanMembership>> {
        self.db.contribution_ranking(clan_id)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::db::FriendStatus;
    use crate::types::EngineError;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_crossed_friend_requests() {
        let engine = engine();
        engine.create_account("alice", 0).await.unwrap();
        engine.create_account("bob", 0).await.unwrap();

        engine.send_friend_request("alice", "bob").await.unwrap();
        assert!(matches!(
            engine.send_friend_request("bob", "alice").await,
            Err(EngineError::AlreadyExists(_))
        ));
        assert_eq!(engine.stats().unwrap().friendship_counts.values().sum::<usize>(), 1);

        let incoming = engine.incoming_requests("bob").await.unwrap();
        assert_eq!(incoming.len(), 1);
        engine.respond_friend_request("bob", "alice", true).await.unwrap();
        assert_eq!(engine.friends_of("alice").await.unwrap(), vec!["bob".to_string()]);
        assert_eq!(
            engine.friendship("bob", "alice").await.unwrap().unwrap().status,
            FriendStatus::Accepted
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_simultaneous_requests_create_one_record() {
        let engine = Arc::new(engine());
        engine.create_account("alice", 0).await.unwrap();
        engine.create_account("bob", 0).await.unwrap();

        let a = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.send_friend_request("alice", "bob").await })
        };
        let b = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.send_friend_request("bob", "alice").await })
        };
        let results = [a.await.unwrap(), b.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(engine.stats().unwrap().friendship_counts.get("pending"), Some(&1));
    }

    #[tokio::test]
    async fn test_clan_lifecycle() {
        let engine = engine();
        for user in ["alice", "bob", "carol"] {
            engine.create_account(user, 0).await.unwrap();
        }

        let clan = engine.create_clan("Study Buddies", "alice").await.unwrap();
        engine.join_clan("bob", &clan.id).await.unwrap();
        engine.join_clan("carol", &clan.id).await.unwrap();
        assert!(matches!(
            engine.create_clan("STUDY BUDDIES", "bob").await,
            Err(EngineError::DuplicateName(_))
        ));

        engine.apply_reward("bob", 0, 200).await.unwrap();
        engine.apply_reward("carol", 0, 200).await.unwrap();
        engine.apply_reward("alice", 0, 50).await.unwrap();

        let ranking = engine.contribution_ranking(&clan.id).await.unwrap();
        let order: Vec<&str> = ranking.iter().map(|m| m.user_id.as_str()).collect();
        assert_eq!(order, vec!["bob", "carol", "alice"]);

        let clan_now = engine.clan_of("carol").await.unwrap().unwrap();
        assert_eq!(clan_now.total_experience, 450);
        assert_eq!(clan_now.member_count, 3);

        assert!(matches!(
            engine.leave_clan("alice").await,
            Err(EngineError::Forbidden(_))
        ));
        engine.transfer_leadership(&clan.id, "alice", "carol").await.unwrap();
        engine.leave_clan("alice").await.unwrap();
        assert!(engine.clan_of("alice").await.unwrap().is_none());
        assert_eq!(engine.get_clan(&clan.id).await.unwrap().member_count, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_joins_and_leaves_keep_member_count() {
        let engine = Arc::new(engine());
        engine.create_account("leader", 0).await.unwrap();
        let users: Vec<String> = (0..18).map(|i| format!("user{:02}", i)).collect();
        for user in &users {
            engine.create_account(user, 0).await.unwrap();
        }
        let clan = engine.create_clan("Night Owls", "leader").await.unwrap();

        let mut handles = Vec::new();
        for user in &users[..12] {
            let engine = engine.clone();
            let (user, clan_id) = (user.clone(), clan.id.clone());
            handles.push(tokio::spawn(async move { engine.join_clan(&user, &clan_id).await.map(|_| ()) }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(engine.get_clan(&clan.id).await.unwrap().member_count, 13);

        // first six leave while the last six join
        let mut handles = Vec::new();
        for user in &users[..6] {
            let engine = engine.clone();
            let user = user.clone();
            handles.push(tokio::spawn(async move { engine.leave_clan(&user).await.map(|_| ()) }));
        }
        for user in &users[12..] {
            let engine = engine.clone();
            let (user, clan_id) = (user.clone(), clan.id.clone());
            handles.push(tokio::spawn(async move { engine.join_clan(&user, &clan_id).await.map(|_| ()) }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let clan_now = engine.get_clan(&clan.id).await.unwrap();
        assert_eq!(clan_now.member_count, 13);
        assert_eq!(
            clan_now.member_count as usize,
            engine.db().clan_membership_rows(&clan.id).unwrap()
        );
        assert_eq!(engine.contribution_ranking(&clan.id).await.unwrap().len(), 13);
    }

    #[tokio::test]
    async fn test_block_and_remove() {
        let engine = engine();
        engine.create_account("alice", 0).await.unwrap();
        engine.create_account("bob", 0).await.unwrap();

        let blocked = engine.block_user("bob", "alice").await.unwrap();
        assert_eq!(blocked.status, FriendStatus::Blocked);
        engine.remove_friendship("alice", "bob").await.unwrap();
        assert!(engine.friendship("alice", "bob").await.unwrap().is_none());
    }
}
